// Structural trait satisfaction. A type implements a trait here when its
// method-name set covers the trait's; traits with no methods are skipped
// so they never match every type in the program.

use std::collections::{HashMap, HashSet};

use crate::domain::model::SymbolTables;
use crate::domain::resolver::InterfaceImplMap;

pub fn resolve_implementations(symbols: &SymbolTables) -> InterfaceImplMap {
    let mut methods_by_type: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (ty, name) in symbols.selections.keys() {
        methods_by_type
            .entry(ty.as_str())
            .or_default()
            .insert(name.as_str());
    }

    let mut map = InterfaceImplMap::new();
    for (trait_name, decl) in &symbols.interfaces {
        if decl.methods.is_empty() {
            continue;
        }
        let mut satisfying: Vec<String> = methods_by_type
            .iter()
            .filter(|(_, names)| decl.methods.iter().all(|m| names.contains(m.name.as_str())))
            .map(|(ty, _)| ty.to_string())
            .collect();
        satisfying.sort();
        if !satisfying.is_empty() {
            map.insert(trait_name.clone(), satisfying);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ProgramModel;

    fn impls_of(code: &str) -> InterfaceImplMap {
        let model = ProgramModel::build(&[(
            "app".to_string(),
            "src/lib.rs".to_string(),
            code.to_string(),
        )]);
        resolve_implementations(&model.symbols)
    }

    #[test]
    fn superset_of_method_names_satisfies() {
        let impls = impls_of(
            r#"
            trait Greeter {
                fn greet(&self);
            }
            struct En;
            impl En {
                fn greet(&self) {}
                fn extra(&self) {}
            }
            struct Silent;
            impl Silent {
                fn wave(&self) {}
            }
            "#,
        );
        assert_eq!(impls["Greeter"], vec!["En".to_string()]);
    }

    #[test]
    fn empty_traits_match_nothing() {
        let impls = impls_of(
            r#"
            trait Marker {}
            struct Anything;
            impl Anything {
                fn work(&self) {}
            }
            "#,
        );
        assert!(!impls.contains_key("Marker"));
    }

    #[test]
    fn multiple_implementations_are_sorted() {
        let impls = impls_of(
            r#"
            trait Greeter {
                fn greet(&self);
            }
            struct Zh;
            impl Zh {
                fn greet(&self) {}
            }
            struct En;
            impl En {
                fn greet(&self) {}
            }
            "#,
        );
        assert_eq!(impls["Greeter"], vec!["En".to_string(), "Zh".to_string()]);
    }
}
