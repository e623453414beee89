//! Memory accounting for loaded index structures

use serde::Serialize;

/// Something that knows roughly how much heap it holds
pub trait Accountable {
    /// Approximate heap bytes held
    fn ram_bytes_used(&self) -> u64;

    /// Named breakdown of the bytes held, if any
    fn child_resources(&self) -> Vec<RamTree> {
        Vec::new()
    }
}

/// Named memory-accounting tree, attached to verbose segment listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RamTree {
    /// Resource name
    pub name: String,
    /// Bytes held by this resource, children included
    pub bytes: u64,
    /// Breakdown by sub-resource
    pub children: Vec<RamTree>,
}

impl RamTree {
    /// Tree for `resource` under the given name
    pub fn named(name: impl Into<String>, resource: &dyn Accountable) -> Self {
        RamTree {
            name: name.into(),
            bytes: resource.ram_bytes_used(),
            children: resource.child_resources(),
        }
    }

    /// Leaf with no breakdown
    pub fn leaf(name: impl Into<String>, bytes: u64) -> Self {
        RamTree {
            name: name.into(),
            bytes,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64);

    impl Accountable for Fixed {
        fn ram_bytes_used(&self) -> u64 {
            self.0
        }

        fn child_resources(&self) -> Vec<RamTree> {
            vec![RamTree::leaf("half", self.0 / 2)]
        }
    }

    #[test]
    fn test_named_tree() {
        let tree = RamTree::named("root", &Fixed(100));
        assert_eq!(tree.name, "root");
        assert_eq!(tree.bytes, 100);
        assert_eq!(tree.children, vec![RamTree::leaf("half", 50)]);
    }
}
