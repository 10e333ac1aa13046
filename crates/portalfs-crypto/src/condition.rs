//! Access conditions
//!
//! The orchestrator handles conditions as an opaque JSON object (`AccessCondition`).
//! Threshold backends parse that object into the typed `Condition` tree defined here.
//!
//! ```text
//! compound(and)
//! ├── rpc:      eth_getBalance(:userAddress) >= 1
//! └── contract: ERC721 ownerOf(42) == :userAddress
//! ```

use crate::{AccessError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Context parameter resolved to the requester's authenticated address
pub const USER_ADDRESS_PARAM: &str = ":userAddress";

/// Maximum nesting depth for compound conditions
pub const MAX_CONDITION_DEPTH: usize = 4;

/// An access condition as handled by the file orchestrator.
///
/// The content is backend-defined; the orchestrator only checks that it is a
/// non-empty JSON object before handing it to an access provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessCondition(Value);

impl AccessCondition {
    /// Wrap a raw JSON value
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the raw JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the raw JSON value
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Whether the value is a non-empty JSON object
    pub fn is_well_formed(&self) -> bool {
        self.0.as_object().is_some_and(|obj| !obj.is_empty())
    }
}

impl From<Condition> for AccessCondition {
    fn from(condition: Condition) -> Self {
        // Serializing plain data structs into a Value cannot fail
        Self(serde_json::to_value(&condition).unwrap_or(Value::Null))
    }
}

/// Comparison operator of a return value test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl Comparator {
    /// Apply the comparator to two ordered values
    pub fn compare<T: PartialOrd>(&self, actual: &T, expected: &T) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Gt => actual > expected,
            Self::Gte => actual >= expected,
            Self::Lt => actual < expected,
            Self::Lte => actual <= expected,
        }
    }
}

/// Test applied to the value a condition's call returns
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub comparator: Comparator,
    pub value: Value,
}

impl ReturnValueTest {
    pub fn new(comparator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            comparator,
            value: value.into(),
        }
    }

    /// Expected values are u64 numbers, decimal strings, addresses or `:param` references.
    /// Amounts beyond u64 must be written as decimal strings.
    fn validate(&self) -> Result<()> {
        let accepted = match &self.value {
            Value::Number(n) => n.is_u64(),
            Value::String(s) => {
                s.starts_with(':')
                    || (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                    || crate::keys::normalize_address(s).is_ok()
            }
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(AccessError::InvalidCondition(format!(
                "unsupported returnValueTest value: {} (write large amounts as decimal strings)",
                self.value
            )))
        }
    }
}

/// JSON-RPC predicate, e.g. `eth_getBalance`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub return_value_test: ReturnValueTest,
}

/// Contract call predicate (ERC-20 / ERC-721)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<u64>,
    pub contract_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_contract_type: Option<String>,
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub return_value_test: ReturnValueTest,
}

/// Block time predicate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<u64>,
    pub method: String,
    pub return_value_test: ReturnValueTest,
}

/// Boolean operator of a compound condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Boolean combination of conditions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundCondition {
    pub operator: LogicalOperator,
    pub operands: Vec<Condition>,
}

/// A condition understood by threshold backends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "conditionType", rename_all = "camelCase")]
pub enum Condition {
    Rpc(RpcCondition),
    Contract(ContractCondition),
    Time(TimeCondition),
    Compound(CompoundCondition),
}

impl Condition {
    /// Native balance of the requester is at least `min` (wei)
    pub fn native_balance_at_least(min: u128) -> Self {
        Self::Rpc(RpcCondition {
            chain: None,
            method: "eth_getBalance".to_string(),
            parameters: vec![Value::from(USER_ADDRESS_PARAM), Value::from("latest")],
            return_value_test: ReturnValueTest::new(Comparator::Gte, min.to_string()),
        })
    }

    /// ERC-20 balance of the requester is at least `min`
    pub fn erc20_balance_at_least(contract_address: impl Into<String>, min: u128) -> Self {
        Self::Contract(ContractCondition {
            chain: None,
            contract_address: contract_address.into(),
            standard_contract_type: Some("ERC20".to_string()),
            method: "balanceOf".to_string(),
            parameters: vec![Value::from(USER_ADDRESS_PARAM)],
            return_value_test: ReturnValueTest::new(Comparator::Gte, min.to_string()),
        })
    }

    /// The requester owns the given ERC-721 token
    pub fn erc721_owner(contract_address: impl Into<String>, token_id: u64) -> Self {
        Self::Contract(ContractCondition {
            chain: None,
            contract_address: contract_address.into(),
            standard_contract_type: Some("ERC721".to_string()),
            method: "ownerOf".to_string(),
            parameters: vec![Value::from(token_id)],
            return_value_test: ReturnValueTest::new(Comparator::Eq, USER_ADDRESS_PARAM),
        })
    }

    /// The requester holds at least `min` tokens of the ERC-721 collection
    pub fn erc721_balance_at_least(contract_address: impl Into<String>, min: u64) -> Self {
        Self::Contract(ContractCondition {
            chain: None,
            contract_address: contract_address.into(),
            standard_contract_type: Some("ERC721".to_string()),
            method: "balanceOf".to_string(),
            parameters: vec![Value::from(USER_ADDRESS_PARAM)],
            return_value_test: ReturnValueTest::new(Comparator::Gte, min),
        })
    }

    /// Latest block time is at or after `timestamp` (unix seconds)
    pub fn block_time_at_least(timestamp: u64) -> Self {
        Self::Time(TimeCondition {
            chain: None,
            method: "blocktime".to_string(),
            return_value_test: ReturnValueTest::new(Comparator::Gte, timestamp),
        })
    }

    pub fn and(operands: Vec<Condition>) -> Self {
        Self::Compound(CompoundCondition {
            operator: LogicalOperator::And,
            operands,
        })
    }

    pub fn or(operands: Vec<Condition>) -> Self {
        Self::Compound(CompoundCondition {
            operator: LogicalOperator::Or,
            operands,
        })
    }

    pub fn not(operand: Condition) -> Self {
        Self::Compound(CompoundCondition {
            operator: LogicalOperator::Not,
            operands: vec![operand],
        })
    }

    /// Pin a leaf condition to a chain id (compounds apply it to every leaf)
    pub fn on_chain(mut self, chain: u64) -> Self {
        self.for_each_leaf_chain(&mut |slot| *slot = Some(chain));
        self
    }

    /// Parse the typed condition out of an opaque one
    pub fn from_access_condition(condition: &AccessCondition) -> Result<Self> {
        let parsed: Condition = serde_json::from_value(condition.as_value().clone())
            .map_err(|e| AccessError::InvalidCondition(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Fill in `chain` on every leaf that does not name one
    pub fn default_chain(&mut self, chain: u64) {
        self.for_each_leaf_chain(&mut |slot| {
            if slot.is_none() {
                *slot = Some(chain);
            }
        });
    }

    fn for_each_leaf_chain(&mut self, f: &mut dyn FnMut(&mut Option<u64>)) {
        match self {
            Self::Rpc(c) => f(&mut c.chain),
            Self::Contract(c) => f(&mut c.chain),
            Self::Time(c) => f(&mut c.chain),
            Self::Compound(c) => {
                for operand in &mut c.operands {
                    operand.for_each_leaf_chain(f);
                }
            }
        }
    }

    /// Check the structure of the condition tree
    pub fn validate(&self) -> Result<()> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(AccessError::InvalidCondition(format!(
                "conditions may nest at most {} levels",
                MAX_CONDITION_DEPTH
            )));
        }
        match self {
            Self::Rpc(c) if c.method.trim().is_empty() => Err(AccessError::InvalidCondition(
                "rpc condition requires a method".to_string(),
            )),
            Self::Rpc(c) => c.return_value_test.validate(),
            Self::Contract(c) => {
                c.return_value_test.validate()?;
                if c.method.trim().is_empty() {
                    return Err(AccessError::InvalidCondition(
                        "contract condition requires a method".to_string(),
                    ));
                }
                crate::keys::normalize_address(&c.contract_address).map_err(|_| {
                    AccessError::InvalidCondition(format!(
                        "invalid contract address: {}",
                        c.contract_address
                    ))
                })?;
                Ok(())
            }
            Self::Time(c) if c.method != "blocktime" => Err(AccessError::InvalidCondition(
                format!("unsupported time method: {}", c.method),
            )),
            Self::Time(c) => c.return_value_test.validate(),
            Self::Compound(c) => {
                match c.operator {
                    LogicalOperator::Not if c.operands.len() != 1 => {
                        return Err(AccessError::InvalidCondition(
                            "'not' takes exactly one operand".to_string(),
                        ));
                    }
                    LogicalOperator::And | LogicalOperator::Or if c.operands.len() < 2 => {
                        return Err(AccessError::InvalidCondition(
                            "'and'/'or' take at least two operands".to_string(),
                        ));
                    }
                    _ => {}
                }
                c.operands
                    .iter()
                    .try_for_each(|operand| operand.validate_at(depth + 1))
            }
        }
    }

    /// Context parameters (`:name`) the condition needs at decryption time
    pub fn context_parameters(&self) -> BTreeSet<String> {
        let mut params = BTreeSet::new();
        self.collect_context_parameters(&mut params);
        params
    }

    fn collect_context_parameters(&self, params: &mut BTreeSet<String>) {
        let mut push = |value: &Value| {
            if let Some(s) = value.as_str().filter(|s| s.starts_with(':')) {
                params.insert(s.to_string());
            }
        };
        match self {
            Self::Rpc(c) => {
                c.parameters.iter().for_each(&mut push);
                push(&c.return_value_test.value);
            }
            Self::Contract(c) => {
                c.parameters.iter().for_each(&mut push);
                push(&c.return_value_test.value);
            }
            Self::Time(c) => push(&c.return_value_test.value),
            Self::Compound(c) => {
                for operand in &c.operands {
                    operand.collect_context_parameters(params);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NFT: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_condition_json_shape() {
        let condition = Condition::native_balance_at_least(0).on_chain(80002);
        let json = serde_json::to_value(&condition).unwrap();

        assert_eq!(json["conditionType"], "rpc");
        assert_eq!(json["chain"], 80002);
        assert_eq!(json["returnValueTest"]["comparator"], ">=");
        assert_eq!(json["parameters"][0], USER_ADDRESS_PARAM);
    }

    #[test]
    fn test_parse_from_access_condition() {
        let condition = Condition::and(vec![
            Condition::erc721_owner(NFT, 7),
            Condition::block_time_at_least(1_700_000_000),
        ]);
        let opaque = AccessCondition::from(condition.clone());

        assert!(opaque.is_well_formed());
        assert_eq!(Condition::from_access_condition(&opaque).unwrap(), condition);
    }

    #[test]
    fn test_malformed_conditions_rejected() {
        let not_a_condition = AccessCondition::from_value(serde_json::json!({"foo": 1}));
        assert!(matches!(
            Condition::from_access_condition(&not_a_condition),
            Err(AccessError::InvalidCondition(_))
        ));

        let lonely_and = AccessCondition::from(Condition::and(vec![
            Condition::native_balance_at_least(1),
        ]));
        assert!(Condition::from_access_condition(&lonely_and).is_err());

        let bad_address = AccessCondition::from(Condition::erc721_owner("not-an-address", 1));
        assert!(Condition::from_access_condition(&bad_address).is_err());
    }

    #[test]
    fn test_return_value_must_be_exact() {
        let oversized = AccessCondition::from_value(serde_json::json!({
            "conditionType": "rpc",
            "chain": 80002,
            "method": "eth_getBalance",
            "parameters": [USER_ADDRESS_PARAM, "latest"],
            "returnValueTest": {"comparator": ">=", "value": 1e20}
        }));
        assert!(matches!(
            Condition::from_access_condition(&oversized),
            Err(AccessError::InvalidCondition(_))
        ));

        let as_string = AccessCondition::from_value(serde_json::json!({
            "conditionType": "rpc",
            "chain": 80002,
            "method": "eth_getBalance",
            "parameters": [USER_ADDRESS_PARAM, "latest"],
            "returnValueTest": {"comparator": ">=", "value": "100000000000000000000"}
        }));
        assert!(Condition::from_access_condition(&as_string).is_ok());

        let negative = AccessCondition::from(Condition::Time(TimeCondition {
            chain: None,
            method: "blocktime".to_string(),
            return_value_test: ReturnValueTest::new(Comparator::Gte, -5),
        }));
        assert!(Condition::from_access_condition(&negative).is_err());

        let word = AccessCondition::from(Condition::Time(TimeCondition {
            chain: None,
            method: "blocktime".to_string(),
            return_value_test: ReturnValueTest::new(Comparator::Gte, "soon"),
        }));
        assert!(Condition::from_access_condition(&word).is_err());
    }

    #[test]
    fn test_null_is_not_well_formed() {
        assert!(!AccessCondition::from_value(Value::Null).is_well_formed());
        assert!(!AccessCondition::from_value(serde_json::json!({})).is_well_formed());
    }

    #[test]
    fn test_default_chain_keeps_explicit_chain() {
        let mut condition = Condition::or(vec![
            Condition::native_balance_at_least(1).on_chain(1),
            Condition::block_time_at_least(0),
        ]);
        condition.default_chain(137);

        let Condition::Compound(compound) = condition else {
            panic!("expected compound");
        };
        assert!(matches!(&compound.operands[0], Condition::Rpc(c) if c.chain == Some(1)));
        assert!(matches!(&compound.operands[1], Condition::Time(c) if c.chain == Some(137)));
    }

    #[test]
    fn test_context_parameters() {
        let condition = Condition::and(vec![
            Condition::erc721_owner(NFT, 1),
            Condition::block_time_at_least(0),
        ]);
        let params = condition.context_parameters();
        assert_eq!(params.len(), 1);
        assert!(params.contains(USER_ADDRESS_PARAM));

        assert!(Condition::block_time_at_least(0).context_parameters().is_empty());
    }
}
