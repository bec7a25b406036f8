//! Project hierarchy use-case service.
//!
//! # Responsibility
//! - Validate container names above the repository layer.
//! - Provide create, rename, list and cascading delete for every level.
//! - Build the nested Collection ▸ Saga ▸ Tome view of one project.
//!
//! # Invariants
//! - Names are trimmed with whitespace runs collapsed and never blank.
//! - Tree siblings are ordered by `created_at ASC, id ASC` regardless of the
//!   order storage returned them in.
//! - Tree building never writes.

use crate::error::CoreErrorKind;
use crate::model::hierarchy::{
    HierarchyLevel, HierarchyRecord, ProjectId, ProjectOutline, TomeId, TreeNode,
};
use crate::model::text::{normalize_label, normalize_optional};
use crate::repo::error::RepoError;
use crate::repo::hierarchy_repo::HierarchyRepository;
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from hierarchy service operations.
#[derive(Debug)]
pub enum HierarchyServiceError {
    /// Name is blank after trim.
    InvalidName,
    /// Target container does not exist.
    NodeNotFound { level: HierarchyLevel, id: Uuid },
    /// Parent container does not exist.
    ParentNotFound { level: HierarchyLevel, id: Uuid },
    /// Repository-level failure.
    Repo(RepoError),
}

impl HierarchyServiceError {
    pub fn kind(&self) -> CoreErrorKind {
        match self {
            Self::InvalidName => CoreErrorKind::Validation,
            Self::NodeNotFound { .. } | Self::ParentNotFound { .. } => CoreErrorKind::NotFound,
            Self::Repo(err) => err.kind(),
        }
    }
}

impl Display for HierarchyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::NodeNotFound { level, id } => write!(f, "{} not found: {id}", level.as_str()),
            Self::ParentNotFound { level, id } => {
                write!(f, "parent {} not found: {id}", level.as_str())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HierarchyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for HierarchyServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Hierarchy service facade.
pub struct HierarchyService<R: HierarchyRepository> {
    repo: R,
}

impl<R: HierarchyRepository> HierarchyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn create_project(
        &self,
        name: impl Into<String>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        let name = normalize_name(name.into())?;
        let record = self.repo.create_node(HierarchyLevel::Project, None, &name)?;
        info!(
            "event=node_create module=hierarchy status=ok level=project id={}",
            record.id
        );
        Ok(record)
    }

    pub fn create_collection(
        &self,
        project_id: ProjectId,
        name: impl Into<String>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        self.create_child(HierarchyLevel::Collection, project_id, name.into())
    }

    pub fn create_saga(
        &self,
        collection_id: Uuid,
        name: impl Into<String>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        self.create_child(HierarchyLevel::Saga, collection_id, name.into())
    }

    pub fn create_tome(
        &self,
        saga_id: Uuid,
        name: impl Into<String>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        self.create_child(HierarchyLevel::Tome, saga_id, name.into())
    }

    /// Gets one container by level and id.
    pub fn get_node(
        &self,
        level: HierarchyLevel,
        id: Uuid,
    ) -> Result<Option<HierarchyRecord>, HierarchyServiceError> {
        Ok(self.repo.get_node(level, id)?)
    }

    /// Lists all projects in creation order.
    pub fn list_projects(&self) -> Result<Vec<HierarchyRecord>, HierarchyServiceError> {
        Ok(self.repo.list_nodes(HierarchyLevel::Project, None)?)
    }

    /// Lists `level` containers owned by `parent_id`, in creation order.
    pub fn list_children(
        &self,
        level: HierarchyLevel,
        parent_id: Uuid,
    ) -> Result<Vec<HierarchyRecord>, HierarchyServiceError> {
        let Some(parent_level) = level.parent_level() else {
            return self.list_projects();
        };
        if self.repo.get_node(parent_level, parent_id)?.is_none() {
            return Err(HierarchyServiceError::ParentNotFound {
                level: parent_level,
                id: parent_id,
            });
        }
        Ok(self.repo.list_nodes(level, Some(parent_id))?)
    }

    pub fn rename_node(
        &self,
        level: HierarchyLevel,
        id: Uuid,
        name: impl Into<String>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        let name = normalize_name(name.into())?;
        self.repo
            .rename_node(level, id, &name)
            .map_err(|err| not_found_as(err, level, id))?;
        self.require_node(level, id)
    }

    /// Sets or clears a tome summary; blank text clears it.
    pub fn set_tome_summary(
        &self,
        tome_id: TomeId,
        summary: Option<&str>,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        let summary = normalize_optional(summary);
        self.repo
            .set_tome_summary(tome_id, summary.as_deref())
            .map_err(|err| not_found_as(err, HierarchyLevel::Tome, tome_id))?;
        self.require_node(HierarchyLevel::Tome, tome_id)
    }

    /// Deletes one container together with everything it owns.
    pub fn delete_node(&self, level: HierarchyLevel, id: Uuid) -> Result<(), HierarchyServiceError> {
        self.repo
            .delete_node(level, id)
            .map_err(|err| not_found_as(err, level, id))?;
        info!(
            "event=node_delete module=hierarchy status=ok level={} id={id}",
            level.as_str()
        );
        Ok(())
    }

    /// Builds the nested tree for one project.
    pub fn build_tree(&self, project_id: ProjectId) -> Result<Vec<TreeNode>, HierarchyServiceError> {
        let outline = self.repo.load_outline(project_id)?.ok_or(
            HierarchyServiceError::NodeNotFound {
                level: HierarchyLevel::Project,
                id: project_id,
            },
        )?;
        Ok(build_project_tree(&outline))
    }

    fn create_child(
        &self,
        level: HierarchyLevel,
        parent_id: Uuid,
        name: String,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        let name = normalize_name(name)?;
        let record = self
            .repo
            .create_node(level, Some(parent_id), &name)
            .map_err(|err| match err {
                RepoError::NotFound { .. } => HierarchyServiceError::ParentNotFound {
                    level: level.parent_level().unwrap_or(HierarchyLevel::Project),
                    id: parent_id,
                },
                other => HierarchyServiceError::Repo(other),
            })?;
        info!(
            "event=node_create module=hierarchy status=ok level={} id={} parent={parent_id}",
            level.as_str(),
            record.id
        );
        Ok(record)
    }

    fn require_node(
        &self,
        level: HierarchyLevel,
        id: Uuid,
    ) -> Result<HierarchyRecord, HierarchyServiceError> {
        self.repo
            .get_node(level, id)?
            .ok_or(HierarchyServiceError::NodeNotFound { level, id })
    }
}

/// Builds Collection ▸ Saga ▸ Tome nodes from one outline snapshot.
///
/// Records whose parent is not part of the outline are ignored.
pub fn build_project_tree(outline: &ProjectOutline) -> Vec<TreeNode> {
    let mut tomes_by_saga = group_by_parent(&outline.tomes);
    let mut sagas_by_collection = group_by_parent(&outline.sagas);

    sorted(outline.collections.iter().filter(|collection| {
        collection.parent_id == Some(outline.project.id)
    }))
    .into_iter()
    .map(|collection| {
        let sagas = sagas_by_collection.remove(&collection.id).unwrap_or_default();
        let children = sorted(sagas.into_iter())
            .into_iter()
            .map(|saga| {
                let tomes = tomes_by_saga.remove(&saga.id).unwrap_or_default();
                let leaves = sorted(tomes.into_iter())
                    .into_iter()
                    .map(|tome| node(tome, Vec::new()))
                    .collect();
                node(saga, leaves)
            })
            .collect();
        node(collection, children)
    })
    .collect()
}

fn group_by_parent(records: &[HierarchyRecord]) -> HashMap<Uuid, Vec<&HierarchyRecord>> {
    let mut grouped: HashMap<Uuid, Vec<&HierarchyRecord>> = HashMap::new();
    for record in records {
        if let Some(parent_id) = record.parent_id {
            grouped.entry(parent_id).or_default().push(record);
        }
    }
    grouped
}

fn sorted<'a>(records: impl Iterator<Item = &'a HierarchyRecord>) -> Vec<&'a HierarchyRecord> {
    let mut records: Vec<&HierarchyRecord> = records.collect();
    records.sort_by(|left, right| {
        left.created_at
            .cmp(&right.created_at)
            .then(left.id.cmp(&right.id))
    });
    records
}

fn node(record: &HierarchyRecord, children: Vec<TreeNode>) -> TreeNode {
    TreeNode {
        id: record.id,
        title: record.name.clone(),
        level: record.level,
        children,
    }
}

fn normalize_name(value: String) -> Result<String, HierarchyServiceError> {
    normalize_label(&value).ok_or(HierarchyServiceError::InvalidName)
}

fn not_found_as(err: RepoError, level: HierarchyLevel, id: Uuid) -> HierarchyServiceError {
    match err {
        RepoError::NotFound { .. } => HierarchyServiceError::NodeNotFound { level, id },
        other => HierarchyServiceError::Repo(other),
    }
}

#[cfg(test)]
mod tests {
    use super::build_project_tree;
    use crate::model::hierarchy::{HierarchyLevel, HierarchyRecord, ProjectOutline};
    use uuid::Uuid;

    fn record(level: HierarchyLevel, parent: Option<Uuid>, name: &str, at: i64) -> HierarchyRecord {
        HierarchyRecord {
            id: Uuid::new_v4(),
            level,
            parent_id: parent,
            name: name.to_string(),
            summary: None,
            created_at: at,
            updated_at: None,
        }
    }

    fn titles(nodes: &[crate::model::hierarchy::TreeNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.title.as_str()).collect()
    }

    #[test]
    fn sagas_follow_creation_time_not_input_order() {
        let project = record(HierarchyLevel::Project, None, "Project", 0);
        let collection = record(HierarchyLevel::Collection, Some(project.id), "Cycle", 1);
        let t1 = record(HierarchyLevel::Saga, Some(collection.id), "first", 10);
        let t2 = record(HierarchyLevel::Saga, Some(collection.id), "second", 20);
        let t3 = record(HierarchyLevel::Saga, Some(collection.id), "third", 30);

        let outline = ProjectOutline {
            project,
            collections: vec![collection],
            sagas: vec![t3, t1, t2],
            tomes: Vec::new(),
        };

        let tree = build_project_tree(&outline);
        assert_eq!(tree.len(), 1);
        assert_eq!(titles(&tree[0].children), vec!["first", "second", "third"]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let project = record(HierarchyLevel::Project, None, "Project", 0);
        let mut a = record(HierarchyLevel::Collection, Some(project.id), "a", 5);
        let mut b = record(HierarchyLevel::Collection, Some(project.id), "b", 5);
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);

        let outline = ProjectOutline {
            project,
            collections: vec![b, a],
            sagas: Vec::new(),
            tomes: Vec::new(),
        };
        assert_eq!(titles(&build_project_tree(&outline)), vec!["a", "b"]);
    }

    #[test]
    fn tomes_are_leaves_under_their_saga() {
        let project = record(HierarchyLevel::Project, None, "Project", 0);
        let collection = record(HierarchyLevel::Collection, Some(project.id), "Cycle", 1);
        let saga = record(HierarchyLevel::Saga, Some(collection.id), "Saga", 2);
        let late = record(HierarchyLevel::Tome, Some(saga.id), "Book II", 9);
        let early = record(HierarchyLevel::Tome, Some(saga.id), "Book I", 3);

        let outline = ProjectOutline {
            project,
            collections: vec![collection],
            sagas: vec![saga],
            tomes: vec![late, early],
        };

        let tree = build_project_tree(&outline);
        let tomes = &tree[0].children[0].children;
        assert_eq!(titles(tomes), vec!["Book I", "Book II"]);
        assert!(tomes.iter().all(|tome| tome.children.is_empty()));
        assert!(tomes.iter().all(|tome| tome.level == HierarchyLevel::Tome));
    }

    #[test]
    fn empty_project_yields_empty_tree() {
        let outline = ProjectOutline {
            project: record(HierarchyLevel::Project, None, "Empty", 0),
            collections: Vec::new(),
            sagas: Vec::new(),
            tomes: Vec::new(),
        };
        assert!(build_project_tree(&outline).is_empty());
    }
}
