//! Algebraic properties of condition groups.

use proptest::prelude::*;
use veto_engine::predicate::{Condition, ConditionDefinition};
use veto_engine::{BlockingResponse, RequestDetails};

/// Constant leaves: an empty AND is true, an empty OR is false.
fn constant(value: bool) -> ConditionDefinition {
    if value {
        ConditionDefinition::And(vec![])
    } else {
        ConditionDefinition::Or(vec![])
    }
}

#[derive(Debug, Clone)]
enum Tree {
    Leaf(bool),
    And(Vec<Tree>),
    Or(Vec<Tree>),
}

impl Tree {
    fn expected(&self) -> bool {
        match self {
            Tree::Leaf(v) => *v,
            Tree::And(children) => children.iter().all(Tree::expected),
            Tree::Or(children) => children.iter().any(Tree::expected),
        }
    }

    fn definition(&self) -> ConditionDefinition {
        match self {
            Tree::Leaf(v) => constant(*v),
            Tree::And(children) => {
                ConditionDefinition::And(children.iter().map(Tree::definition).collect())
            }
            Tree::Or(children) => {
                ConditionDefinition::Or(children.iter().map(Tree::definition).collect())
            }
        }
    }
}

fn tree() -> impl Strategy<Value = Tree> {
    any::<bool>().prop_map(Tree::Leaf).prop_recursive(4, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Tree::And),
            prop::collection::vec(inner, 0..5).prop_map(Tree::Or),
        ]
    })
}

proptest! {
    #[test]
    fn and_is_conjunction_or_is_disjunction(tree in tree()) {
        let condition = Condition::compile(&tree.definition()).unwrap();
        let details = RequestDetails::parse("https://a.example/").unwrap();
        prop_assert_eq!(
            condition.matches(&details, &BlockingResponse::new()),
            tree.expected()
        );
    }

    #[test]
    fn url_filter_host_suffix_agrees_with_string_suffix(
        label in "[a-z]{1,8}",
        suffix in "(example\\.com|example\\.org|test\\.net)",
    ) {
        let host = format!("{label}.{suffix}");
        let definition: ConditionDefinition = serde_json::from_value(
            serde_json::json!({"urlFilter": {"hostSuffix": "example.com"}})
        ).unwrap();
        let condition = Condition::compile(&definition).unwrap();
        let details = RequestDetails::parse(&format!("https://{host}/")).unwrap();
        prop_assert_eq!(
            condition.matches(&details, &BlockingResponse::new()),
            host.ends_with("example.com")
        );
    }
}
