use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const DEPARTMENT_COLUMNS: &str =
    "id, parent_id, name, description, icon, is_active, created_at, updated_at, created_by, updated_by";

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Department {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

/// Department as returned by the API, with its active children nested.
#[derive(Serialize, Debug, Clone)]
pub struct DepartmentNode {
    pub id: Uuid,
    pub parent: Option<Uuid>,
    pub parent_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub children: Vec<DepartmentNode>,
}

impl DepartmentNode {
    fn leaf(department: &Department, parent_name: Option<String>) -> Self {
        DepartmentNode {
            id: department.id,
            parent: department.parent_id,
            parent_name,
            name: department.name.clone(),
            description: department.description.clone(),
            icon: department.icon.clone(),
            is_active: department.is_active,
            created_at: department.created_at,
            updated_at: department.updated_at,
            created_by: department.created_by,
            updated_by: department.updated_by,
            children: Vec::new(),
        }
    }
}

/// Every department row loaded at once, indexed by id and by parent.
///
/// Rows are expected in display order (by name); child lists keep that order.
/// Only active departments are reachable as children.
pub struct DepartmentForest {
    departments: Vec<Department>,
    by_id: HashMap<Uuid, usize>,
    active_children: HashMap<Uuid, Vec<usize>>,
}

impl DepartmentForest {
    pub fn new(departments: Vec<Department>) -> Self {
        let mut by_id = HashMap::with_capacity(departments.len());
        let mut active_children: HashMap<Uuid, Vec<usize>> = HashMap::new();

        for (pos, department) in departments.iter().enumerate() {
            by_id.insert(department.id, pos);
            if let (true, Some(parent)) = (department.is_active, department.parent_id) {
                active_children.entry(parent).or_default().push(pos);
            }
        }

        DepartmentForest { departments, by_id, active_children }
    }

    pub fn get(&self, id: Uuid) -> Option<&Department> {
        self.by_id.get(&id).map(|&pos| &self.departments[pos])
    }

    pub fn active(&self) -> impl Iterator<Item = &Department> {
        self.departments.iter().filter(|d| d.is_active)
    }

    pub fn active_roots(&self) -> impl Iterator<Item = &Department> {
        self.active().filter(|d| d.parent_id.is_none())
    }

    pub fn active_non_roots(&self) -> impl Iterator<Item = &Department> {
        self.active().filter(|d| d.parent_id.is_some())
    }

    /// Direct active children of `parent`.
    pub fn children_of(&self, parent: Uuid) -> impl Iterator<Item = &Department> {
        self.active_children
            .get(&parent)
            .into_iter()
            .flatten()
            .map(|&pos| &self.departments[pos])
    }

    pub fn parent_name(&self, department: &Department) -> Option<String> {
        department
            .parent_id
            .and_then(|parent| self.get(parent))
            .map(|parent| parent.name.clone())
    }

    /// Serializes `department` with children nested `depth` levels deep.
    /// `depth == 0` yields no children, `depth == 1` only direct children.
    pub fn node(&self, department: &Department, depth: u32) -> DepartmentNode {
        let mut path = HashSet::new();
        self.build(department, depth, &mut path)
    }

    pub fn nodes<'a, I>(&self, departments: I, depth: u32) -> Vec<DepartmentNode>
    where
        I: IntoIterator<Item = &'a Department>,
    {
        departments.into_iter().map(|d| self.node(d, depth)).collect()
    }

    fn build(&self, department: &Department, depth: u32, path: &mut HashSet<Uuid>) -> DepartmentNode {
        let mut node = DepartmentNode::leaf(department, self.parent_name(department));
        if depth == 0 {
            return node;
        }

        path.insert(department.id);
        for child in self.children_of(department.id) {
            // rows written before acyclicity was enforced may still loop
            if path.contains(&child.id) {
                continue;
            }
            node.children.push(self.build(child, depth - 1, path));
        }
        path.remove(&department.id);

        node
    }

    /// True when making `new_parent` the parent of `id` would close a loop,
    /// i.e. `new_parent` is `id` itself or one of its descendants.
    pub fn would_create_cycle(&self, id: Uuid, new_parent: Uuid) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(new_parent);
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            cursor = self.get(current).and_then(|d| d.parent_id);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn department(name: &str, parent: Option<&Department>, active: bool) -> Department {
        let now = Utc::now();
        Department {
            id: Uuid::new_v4(),
            parent_id: parent.map(|p| p.id),
            name: name.to_string(),
            description: None,
            icon: None,
            is_active: active,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        }
    }

    /// Medicine > Cardiology > Pediatric Cardiology > Fetal Cardiology
    ///          > Neurology (inactive)
    /// Surgery
    fn hospital() -> (DepartmentForest, Vec<Uuid>) {
        let medicine = department("Medicine", None, true);
        let cardiology = department("Cardiology", Some(&medicine), true);
        let pediatric = department("Pediatric Cardiology", Some(&cardiology), true);
        let fetal = department("Fetal Cardiology", Some(&pediatric), true);
        let neurology = department("Neurology", Some(&medicine), false);
        let surgery = department("Surgery", None, true);
        let ids = vec![medicine.id, cardiology.id, pediatric.id, fetal.id, neurology.id, surgery.id];
        let rows = vec![cardiology, fetal, medicine, neurology, pediatric, surgery];
        (DepartmentForest::new(rows), ids)
    }

    fn depth_of(node: &DepartmentNode) -> usize {
        1 + node.children.iter().map(depth_of).max().unwrap_or(0)
    }

    #[test]
    fn depth_zero_returns_no_children() {
        let (forest, ids) = hospital();
        let node = forest.node(forest.get(ids[0]).unwrap(), 0);
        assert!(node.children.is_empty());
    }

    #[test]
    fn depth_one_returns_only_immediate_children() {
        let (forest, ids) = hospital();
        let node = forest.node(forest.get(ids[0]).unwrap(), 1);
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].name, "Cardiology");
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn depth_bounds_recursion() {
        let (forest, ids) = hospital();
        let medicine = forest.get(ids[0]).unwrap();
        assert_eq!(depth_of(&forest.node(medicine, 2)), 3);
        assert_eq!(depth_of(&forest.node(medicine, 3)), 4);
        assert_eq!(depth_of(&forest.node(medicine, 10)), 4);
    }

    #[test]
    fn inactive_departments_are_hidden() {
        let (forest, ids) = hospital();
        let names: Vec<_> = forest.active().map(|d| d.name.as_str()).collect();
        assert!(!names.contains(&"Neurology"));
        assert_eq!(forest.children_of(ids[0]).count(), 1);
        // still present in the forest for lookups
        assert!(!forest.get(ids[4]).unwrap().is_active);
    }

    #[test]
    fn roots_and_non_roots_partition_active_rows() {
        let (forest, _) = hospital();
        let roots: Vec<_> = forest.active_roots().map(|d| d.name.clone()).collect();
        assert_eq!(roots, vec!["Medicine", "Surgery"]);
        assert_eq!(forest.active_non_roots().count(), 3);
    }

    #[test]
    fn parent_name_resolves_inactive_parents() {
        let neurology = department("Neurology", None, false);
        let eeg = department("EEG Lab", Some(&neurology), true);
        let eeg_id = eeg.id;
        let forest = DepartmentForest::new(vec![eeg, neurology]);
        let node = forest.node(forest.get(eeg_id).unwrap(), 3);
        assert_eq!(node.parent_name.as_deref(), Some("Neurology"));
    }

    #[test]
    fn reparenting_under_descendant_is_a_cycle() {
        let (forest, ids) = hospital();
        let (medicine, cardiology, fetal, surgery) = (ids[0], ids[1], ids[3], ids[5]);
        assert!(forest.would_create_cycle(medicine, fetal));
        assert!(forest.would_create_cycle(cardiology, cardiology));
        assert!(!forest.would_create_cycle(cardiology, surgery));
        assert!(!forest.would_create_cycle(surgery, fetal));
    }

    #[test]
    fn existing_loops_do_not_hang_tree_building() {
        let mut a = department("A", None, true);
        let b = department("B", Some(&a), true);
        a.parent_id = Some(b.id);
        let a_id = a.id;
        let forest = DepartmentForest::new(vec![a, b]);
        let node = forest.node(forest.get(a_id).unwrap(), 16);
        assert_eq!(node.children.len(), 1);
        assert!(node.children[0].children.is_empty());
        assert!(!forest.would_create_cycle(Uuid::new_v4(), a_id));
    }
}
