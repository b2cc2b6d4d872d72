//! Parsed operations, request payloads and execution results.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use graphql_parser::query::{Definition, Document, OperationDefinition, Selection, SelectionSet};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult, GraphqlError};

/// Where a query was authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file, when known.
    pub file: Option<String>,
    /// Line within the file, when known.
    pub line: Option<u32>,
}

impl SourceLocation {
    /// Location of the function that called into a `#[track_caller]` chain.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: Some(location.file().to_string()),
            line: Some(location.line()),
        }
    }

    /// Build from optional caller-supplied metadata.
    ///
    /// Returns `None` when neither file nor line is known.
    #[must_use]
    pub fn explicit(file: Option<&str>, line: Option<u32>) -> Option<Self> {
        if file.is_none() && line.is_none() {
            return None;
        }
        Some(Self {
            file: file.map(str::to_string),
            line,
        })
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}"),
            (Some(file), None) => f.write_str(file),
            (None, Some(line)) => write!(f, "line {line}"),
            (None, None) => f.write_str("unknown location"),
        }
    }
}

/// Operation type of a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read operation.
    Query,
    /// Write operation.
    Mutation,
    /// Long-lived operation (not executable over HTTP).
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        })
    }
}

/// A parsed GraphQL operation, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    text: String,
    kind: OperationKind,
    name: Option<String>,
    root_fields: Vec<String>,
    source: Option<SourceLocation>,
}

impl Operation {
    /// Parse query text into an operation.
    ///
    /// The document must define exactly one operation; fragments are allowed.
    pub fn parse(text: impl Into<String>, source: Option<SourceLocation>) -> GatewayResult<Self> {
        let text = text.into();
        let document = match graphql_parser::parse_query::<String>(&text) {
            Ok(document) => document.into_static(),
            Err(err) => {
                return Err(GatewayError::Validation {
                    message: format!("failed to parse GraphQL document: {err}"),
                    location: source,
                });
            }
        };

        let (kind, name, selection_set) = match single_operation(&document) {
            Ok(found) => found,
            Err(message) => {
                return Err(GatewayError::Validation {
                    message,
                    location: source,
                });
            }
        };
        let root_fields = root_field_names(selection_set);

        Ok(Self {
            text,
            kind,
            name,
            root_fields,
            source,
        })
    }

    /// Query text as sent to the server.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Operation type.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Operation name, if the document names it.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Top-level field names selected directly by the operation.
    #[must_use]
    pub fn root_fields(&self) -> &[String] {
        &self.root_fields
    }

    /// Where the operation was authored.
    #[must_use]
    pub const fn source(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }
}

type StaticDocument = Document<'static, String>;
type StaticSelectionSet = SelectionSet<'static, String>;

fn single_operation(
    document: &StaticDocument,
) -> Result<(OperationKind, Option<String>, &StaticSelectionSet), String> {
    let operations: Vec<&OperationDefinition<'static, String>> = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            Definition::Fragment(_) => None,
        })
        .collect();

    let [operation] = operations.as_slice() else {
        return Err(format!(
            "expected exactly one operation in GraphQL document, found {}",
            operations.len()
        ));
    };

    Ok(match *operation {
        OperationDefinition::SelectionSet(set) => (OperationKind::Query, None, set),
        OperationDefinition::Query(query) => {
            (OperationKind::Query, query.name.clone(), &query.selection_set)
        }
        OperationDefinition::Mutation(mutation) => (
            OperationKind::Mutation,
            mutation.name.clone(),
            &mutation.selection_set,
        ),
        OperationDefinition::Subscription(subscription) => (
            OperationKind::Subscription,
            subscription.name.clone(),
            &subscription.selection_set,
        ),
    })
}

fn root_field_names(selection_set: &StaticSelectionSet) -> Vec<String> {
    selection_set
        .items
        .iter()
        .filter_map(|selection| match selection {
            Selection::Field(field) => Some(field.name.clone()),
            Selection::FragmentSpread(_) | Selection::InlineFragment(_) => None,
        })
        .collect()
}

/// GraphQL request payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest<'a> {
    /// Query text.
    pub query: &'a str,
    /// Variables.
    pub variables: serde_json::Value,
    /// Optional operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
}

impl<'a> GraphqlRequest<'a> {
    /// Build the payload for an operation.
    #[must_use]
    pub fn new(operation: &'a Operation, variables: Option<serde_json::Value>) -> Self {
        Self {
            query: operation.as_str(),
            variables: variables
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            operation_name: operation.name(),
        }
    }
}

/// Result of one executed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Response data.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// GraphQL errors; `None` when the server omitted the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphqlError>>,
    /// Extensions payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl ExecutionResult {
    /// Returns `true` if no GraphQL errors were returned.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.as_ref().is_none_or(Vec::is_empty)
    }

    /// Return the result unchanged if it carries no errors, otherwise the
    /// classified error. `data` is dropped whenever errors are present.
    pub fn check(self) -> GatewayResult<Self> {
        let retry_after = self.cost().and_then(|cost| cost.wait_for_capacity());
        let errors = self.errors.clone().unwrap_or_default();
        match GatewayError::from_graphql_errors(errors, retry_after) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Decode the Shopify query cost block, when present.
    #[must_use]
    pub fn cost(&self) -> Option<QueryCost> {
        let cost = self.extensions.as_ref()?.get("cost")?;
        serde_json::from_value(cost.clone()).ok()
    }

    /// Deserialize `data` into a typed value.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> GatewayResult<Option<T>> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
            .map_err(GatewayError::from)
    }
}

/// Shopify query cost extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCost {
    /// Cost estimated before execution.
    pub requested_query_cost: f64,
    /// Cost charged after execution (absent when throttled).
    #[serde(default)]
    pub actual_query_cost: Option<f64>,
    /// Bucket state after the request.
    pub throttle_status: ThrottleStatus,
}

/// Leaky-bucket state reported by Shopify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    /// Bucket size.
    pub maximum_available: f64,
    /// Points available now.
    pub currently_available: f64,
    /// Points restored per second.
    pub restore_rate: f64,
}

impl QueryCost {
    /// Time until enough points are restored to run the request again.
    #[must_use]
    pub fn wait_for_capacity(&self) -> Option<Duration> {
        let status = &self.throttle_status;
        if status.restore_rate <= 0.0 {
            return None;
        }
        let missing = self.requested_query_cost - status.currently_available;
        if missing <= 0.0 {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(missing / status.restore_rate).ok()
    }
}
