//! Tag scoping and tag/text filtering shared by the four lore kinds.

pub mod filter;
pub mod scope;
