// Function identity for tracegen.
// A descriptor is the canonical, hashable key for one declared function.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Canonical identity of a declared function.
///
/// Two descriptors are equal iff `(package, receiver, name, signature)`
/// match. `source_file` / `source_line` are carried for diagnostics only
/// and never participate in equality or hashing, so a redeclaration seen
/// through another file path still resolves to the same graph node.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct FuncDescriptor {
    /// Crate the function lives in.
    pub package: String,
    /// Receiver type for methods, trait name for interface-keyed
    /// descriptors, `None` for free functions.
    pub receiver: Option<String>,
    pub name: String,
    /// Normalized signature rendering, e.g. `fn(i32) -> bool`.
    pub signature: String,
    pub source_file: String,
    pub source_line: usize,
}

impl PartialEq for FuncDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.package == other.package
            && self.receiver == other.receiver
            && self.name == other.name
            && self.signature == other.signature
    }
}

impl Hash for FuncDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.package.hash(state);
        self.receiver.hash(state);
        self.name.hash(state);
        self.signature.hash(state);
    }
}

impl FuncDescriptor {
    /// Qualified id without the signature part, e.g. `mycrate.Server.run`.
    pub fn id(&self) -> String {
        match &self.receiver {
            Some(recv) => format!("{}.{}.{}", self.package, recv, self.name),
            None => format!("{}.{}", self.package, self.name),
        }
    }

    /// Stable `id:signature` key. This is the string the control panel
    /// round-trips when designating an entry point or a function set.
    pub fn type_hash(&self) -> String {
        format!("{}:{}", self.id(), self.signature)
    }
}

impl fmt::Display for FuncDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn desc(file: &str, line: usize) -> FuncDescriptor {
        FuncDescriptor {
            package: "app".to_string(),
            receiver: Some("Server".to_string()),
            name: "run".to_string(),
            signature: "fn(&Self)".to_string(),
            source_file: file.to_string(),
            source_line: line,
        }
    }

    #[test]
    fn equality_ignores_location() {
        let a = desc("src/a.rs", 10);
        let b = desc("src/b.rs", 99);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn type_hash_includes_receiver_and_signature() {
        let d = desc("src/a.rs", 1);
        assert_eq!(d.type_hash(), "app.Server.run:fn(&Self)");

        let free = FuncDescriptor {
            receiver: None,
            ..desc("src/a.rs", 1)
        };
        assert_eq!(free.type_hash(), "app.run:fn(&Self)");
    }

    #[test]
    fn different_signatures_are_different_nodes() {
        let a = desc("src/a.rs", 1);
        let mut b = desc("src/a.rs", 1);
        b.signature = "fn(&Self, i32)".to_string();
        assert_ne!(a, b);
    }
}
