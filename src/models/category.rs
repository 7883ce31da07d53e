//! Categories form a shallow tree stored by parent pointer
use std::collections::{HashMap, HashSet, VecDeque};

use types::CategoryId;

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub position: i32,
}

/// Category with nested children
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CategoryTree {
    pub id: CategoryId,
    pub name: String,
    pub children: Vec<CategoryTree>,
}

/// Returns `root` and all its descendants, in breadth-first order.
/// Unknown roots yield only themselves.
pub fn category_closure(root: CategoryId, categories: &[Category]) -> Vec<CategoryId> {
    let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
    for category in categories {
        if let Some(parent) = category.parent_id {
            children.entry(parent).or_insert_with(Vec::new).push(category.id);
        }
    }

    let mut visited = HashSet::new();
    let mut result = vec![];
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(id) = queue.pop_front() {
        // guards against cycles in bad data
        if !visited.insert(id) {
            continue;
        }
        result.push(id);
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().cloned());
        }
    }
    result
}

/// Builds the forest of root categories ordered by position
pub fn build_category_tree(categories: &[Category]) -> Vec<CategoryTree> {
    fn subtree(category: &Category, categories: &[Category], depth: usize) -> CategoryTree {
        let mut kids = categories
            .iter()
            .filter(|c| c.parent_id == Some(category.id))
            .collect::<Vec<_>>();
        kids.sort_by_key(|c| (c.position, c.id));
        CategoryTree {
            id: category.id,
            name: category.name.clone(),
            children: if depth > 16 {
                vec![]
            } else {
                kids.into_iter().map(|c| subtree(c, categories, depth + 1)).collect()
            },
        }
    }

    let mut roots = categories.iter().filter(|c| c.parent_id.is_none()).collect::<Vec<_>>();
    roots.sort_by_key(|c| (c.position, c.id));
    roots.into_iter().map(|c| subtree(c, categories, 0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i32, parent: Option<i32>) -> Category {
        Category {
            id: CategoryId(id),
            name: format!("category {}", id),
            parent_id: parent.map(CategoryId),
            position: id,
        }
    }

    #[test]
    fn test_closure_includes_root_and_descendants() {
        let categories = vec![
            category(1, None),
            category(2, Some(1)),
            category(3, Some(1)),
            category(4, Some(2)),
            category(5, None),
        ];
        let closure = category_closure(CategoryId(1), &categories);
        assert_eq!(closure, vec![CategoryId(1), CategoryId(2), CategoryId(3), CategoryId(4)]);
        assert_eq!(category_closure(CategoryId(5), &categories), vec![CategoryId(5)]);
    }

    #[test]
    fn test_tree_nests_children() {
        let categories = vec![category(2, Some(1)), category(1, None), category(3, None)];
        let tree = build_category_tree(&categories);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children[0].id, CategoryId(2));
        assert!(tree[1].children.is_empty());
    }
}
