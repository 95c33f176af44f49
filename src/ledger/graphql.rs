use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SETTLE_MUTATION: &str = r#"
mutation($caller: AccountOwner!) {
    settle(caller: $caller)
}
"#;

pub const ALL_APPS_FOR_BETTING_QUERY: &str = r#"
query GetAllAppsForBetting {
    getAllAppsForBetting {
        appId
        name
        totalBet
        rank
        supporters
    }
}
"#;

pub const ALL_APPS_QUERY: &str = r#"
query GetAllApps {
    getAllApps {
        appId
        name
        addedAt
    }
}
"#;

pub const USER_BETS_QUERY: &str = r#"
query GetUserBets($owner: AccountOwner) {
    getUserBets(owner: $owner) {
        appId
        amount
        timestamp
    }
}
"#;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

/// Standard GraphQL response envelope.
///
/// `errors` is kept as raw JSON: the ledger is free to attach extensions
/// and they are logged verbatim.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<Value>>,
}

impl<T> GraphQlResponse<T> {
    /// Human readable error list, `None` when the response carries no error list.
    pub fn error_messages(&self) -> Option<Vec<String>> {
        self.errors
            .as_ref()
            .map(|errors| errors.iter().map(render_error).collect())
    }
}

fn render_error(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_prefer_message_field() {
        let response: GraphQlResponse<Value> = serde_json::from_str(
            r#"{"data":null,"errors":[{"message":"Unauthorized caller","locations":[]},{"code":7}]}"#,
        )
        .unwrap();

        let messages = response.error_messages().unwrap();
        assert_eq!(messages[0], "Unauthorized caller");
        assert_eq!(messages[1], r#"{"code":7}"#);
    }

    #[test]
    fn test_absent_and_null_errors() {
        let response: GraphQlResponse<Value> =
            serde_json::from_str(r#"{"data":{"settle":null}}"#).unwrap();
        assert!(response.error_messages().is_none());

        let response: GraphQlResponse<Value> =
            serde_json::from_str(r#"{"data":{"settle":null},"errors":null}"#).unwrap();
        assert!(response.error_messages().is_none());
    }

    #[test]
    fn test_empty_error_list_still_counts() {
        let response: GraphQlResponse<Value> =
            serde_json::from_str(r#"{"errors":[]}"#).unwrap();
        assert_eq!(response.error_messages(), Some(vec![]));
    }
}
