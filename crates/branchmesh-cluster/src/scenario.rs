//! Scenario files: the replica set and each customer's event list.
//!
//! A scenario is a JSON array of entities:
//!
//! ```json
//! [
//!   { "type": "branch", "id": 0, "balance": 100 },
//!   { "type": "customer", "id": 0, "events": [
//!       { "interface": "deposit", "money": 10 },
//!       { "interface": "query", "dest": 1 }
//!   ] }
//! ]
//! ```
//!
//! An event without `dest` targets the replica whose id equals the
//! customer's id.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use branchmesh_client::SessionEvent;
use branchmesh_types::{CustomerId, Operation, OperationKind, ReplicaId};
use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// One entry of a scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Branch(BranchSpec),
    Customer(CustomerSpec),
}

/// A replica and its initial balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub id: ReplicaId,
    pub balance: i64,
}

/// A customer and its events as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSpec {
    pub id: CustomerId,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub interface: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<ReplicaId>,
}

/// A customer with every event resolved to a target and an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerPlan {
    pub id: CustomerId,
    pub events: Vec<SessionEvent>,
}

/// A validated scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    branches: Vec<BranchSpec>,
    customers: Vec<CustomerPlan>,
}

impl Scenario {
    /// Parses and validates a scenario from JSON text.
    pub fn parse(json: &str) -> ClusterResult<Self> {
        let entities: Vec<Entity> = serde_json::from_str(json)?;
        Self::from_entities(entities)
    }

    /// Reads, parses and validates a scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ClusterError::ScenarioRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Validates entities in declaration order.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> ClusterResult<Self> {
        let mut branches = Vec::new();
        let mut customer_specs = Vec::new();
        for entity in entities {
            match entity {
                Entity::Branch(branch) => branches.push(branch),
                Entity::Customer(customer) => customer_specs.push(customer),
            }
        }

        if branches.is_empty() {
            return Err(invalid("scenario declares no branches"));
        }

        let mut ids = BTreeSet::new();
        for branch in &branches {
            if !ids.insert(branch.id) {
                return Err(invalid(format!("branch {} declared more than once", branch.id)));
            }
        }

        let customers = customer_specs
            .into_iter()
            .map(|customer| plan_customer(&customer, &ids))
            .collect::<ClusterResult<Vec<_>>>()?;

        Ok(Self {
            branches,
            customers,
        })
    }

    /// Branches in declaration order.
    pub fn branches(&self) -> &[BranchSpec] {
        &self.branches
    }

    /// Customers in declaration order.
    pub fn customers(&self) -> &[CustomerPlan] {
        &self.customers
    }

    pub fn event_count(&self) -> usize {
        self.customers.iter().map(|c| c.events.len()).sum()
    }
}

fn plan_customer(customer: &CustomerSpec, branches: &BTreeSet<ReplicaId>) -> ClusterResult<CustomerPlan> {
    let events = customer
        .events
        .iter()
        .enumerate()
        .map(|(index, event)| -> ClusterResult<SessionEvent> {
            let target = event
                .dest
                .or_else(|| customer.id.home_replica())
                .filter(|target| branches.contains(target))
                .ok_or_else(|| {
                    invalid(format!(
                        "customer {} event {index} targets unknown branch {}",
                        customer.id,
                        event
                            .dest
                            .map_or_else(|| customer.id.to_string(), |dest| dest.to_string())
                    ))
                })?;

            let operation = match event.interface {
                OperationKind::Query => Operation::Query,
                OperationKind::Deposit => Operation::Deposit {
                    amount: money(customer.id, index, event)?,
                },
                OperationKind::Withdraw => Operation::Withdraw {
                    amount: money(customer.id, index, event)?,
                },
            };

            Ok(SessionEvent::new(target, operation))
        })
        .collect::<ClusterResult<Vec<_>>>()?;

    Ok(CustomerPlan {
        id: customer.id,
        events,
    })
}

fn money(customer: CustomerId, index: usize, event: &ScenarioEvent) -> ClusterResult<i64> {
    match event.money {
        Some(amount) if amount > 0 => Ok(amount),
        Some(amount) => Err(invalid(format!(
            "customer {customer} event {index}: {} amount must be positive, got {amount}",
            event.interface
        ))),
        None => Err(invalid(format!(
            "customer {customer} event {index}: {} requires money",
            event.interface
        ))),
    }
}

fn invalid(message: impl Into<String>) -> ClusterError {
    ClusterError::InvalidScenario(message.into())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    const THREE_BRANCHES: &str = r#"[
        {"type": "branch", "id": 0, "balance": 100},
        {"type": "branch", "id": 1, "balance": 100},
        {"type": "branch", "id": 2, "balance": 100},
        {"type": "customer", "id": 0, "events": [
            {"interface": "deposit", "money": 10, "dest": 0},
            {"interface": "withdraw", "money": 5, "dest": 0},
            {"interface": "query", "dest": 1}
        ]},
        {"type": "customer", "id": 2, "events": [
            {"id": 7, "interface": "query"}
        ]}
    ]"#;

    #[test]
    fn parses_branches_and_customers_in_declaration_order() {
        let scenario = Scenario::parse(THREE_BRANCHES).unwrap();

        let ids: Vec<_> = scenario.branches().iter().map(|b| b.id.as_u32()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(scenario.customers().len(), 2);
        assert_eq!(scenario.event_count(), 4);
        assert_eq!(
            scenario.customers()[0].events,
            vec![
                SessionEvent::new(ReplicaId::new(0), Operation::Deposit { amount: 10 }),
                SessionEvent::new(ReplicaId::new(0), Operation::Withdraw { amount: 5 }),
                SessionEvent::new(ReplicaId::new(1), Operation::Query),
            ]
        );
    }

    #[test]
    fn event_without_dest_targets_customers_own_branch() {
        let scenario = Scenario::parse(THREE_BRANCHES).unwrap();
        assert_eq!(
            scenario.customers()[1].events,
            vec![SessionEvent::new(ReplicaId::new(2), Operation::Query)]
        );
    }

    #[test_case(r#"[]"#; "empty scenario")]
    #[test_case(r#"[{"type":"customer","id":0,"events":[]}]"#; "no branches")]
    #[test_case(r#"[{"type":"branch","id":1,"balance":5},{"type":"branch","id":1,"balance":5}]"#; "duplicate branch")]
    #[test_case(r#"[{"type":"branch","id":0,"balance":5},{"type":"customer","id":0,"events":[{"interface":"query","dest":3}]}]"#; "unknown dest")]
    #[test_case(r#"[{"type":"branch","id":0,"balance":5},{"type":"customer","id":4,"events":[{"interface":"query"}]}]"#; "unknown home branch")]
    #[test_case(r#"[{"type":"branch","id":0,"balance":5},{"type":"customer","id":0,"events":[{"interface":"deposit"}]}]"#; "missing money")]
    #[test_case(r#"[{"type":"branch","id":0,"balance":5},{"type":"customer","id":0,"events":[{"interface":"withdraw","money":0}]}]"#; "zero money")]
    fn rejects_invalid_scenarios(json: &str) {
        let err = Scenario::parse(json).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidScenario(_)), "{err}");
        assert!(err.is_configuration());
    }

    #[test_case(r#"{"type":"branch"}"#; "not an array")]
    #[test_case(r#"[{"type":"atm","id":0}]"#; "unknown entity type")]
    #[test_case(r#"[{"type":"branch","id":0,"balance":5},{"type":"customer","id":0,"events":[{"interface":"transfer"}]}]"#; "unknown interface")]
    fn rejects_malformed_json(json: &str) {
        let err = Scenario::parse(json).unwrap_err();
        assert!(matches!(err, ClusterError::ScenarioParse(_)), "{err}");
    }

    #[test]
    fn reads_scenario_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(&path, THREE_BRANCHES).unwrap();

        assert_eq!(
            Scenario::from_file(&path).unwrap(),
            Scenario::parse(THREE_BRANCHES).unwrap()
        );
        assert!(matches!(
            Scenario::from_file(dir.path().join("missing.json")),
            Err(ClusterError::ScenarioRead { .. })
        ));
    }
}
