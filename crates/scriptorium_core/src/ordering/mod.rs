//! Chapter ordering within a tome.
//!
//! Planning lives here and is storage-free; `repo::chapter_repo` applies
//! plans inside one immediate transaction per tome operation.

pub mod position;
