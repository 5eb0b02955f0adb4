//! Structured request documents.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The two request documents the exchange accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Create,
    Transaction,
}

impl RequestKind {
    /// All request kinds, in reporting order.
    pub const ALL: [RequestKind; 2] = [RequestKind::Create, RequestKind::Transaction];

    /// Stable label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Create => "create",
            RequestKind::Transaction => "transaction",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(RequestKind::Create),
            "transaction" | "transactions" => Ok(RequestKind::Transaction),
            _ => Err(format!("Unknown request kind: {s}")),
        }
    }
}

/// A new account with an opening balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub balance: Decimal,
}

/// A share position credited to an account under a `<symbol>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolAccount {
    pub id: String,
    pub shares: u32,
}

/// A symbol with the accounts that receive shares of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub accounts: Vec<SymbolAccount>,
}

/// One top-level child of a `<create>` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CreateElement {
    Account(Account),
    Symbol(Symbol),
}

/// A `<create>` document. Elements keep the order they were generated in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub elements: Vec<CreateElement>,
}

impl CreateRequest {
    /// Accounts in document order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.elements.iter().filter_map(|e| match e {
            CreateElement::Account(a) => Some(a),
            CreateElement::Symbol(_) => None,
        })
    }

    /// Symbols in document order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.elements.iter().filter_map(|e| match e {
            CreateElement::Symbol(s) => Some(s),
            CreateElement::Account(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Open a buy (positive amount) or sell (negative amount) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub amount: i32,
    pub limit: Decimal,
    /// Client-side transaction id. The server assigns its own order ids,
    /// so this is not rendered; correlated query/cancel actions reuse it.
    pub trans_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub trans_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub trans_id: String,
}

/// One child of a `<transactions>` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Order(Order),
    Query(Query),
    Cancel(Cancel),
}

impl Action {
    /// Transaction id carried by this action.
    pub fn trans_id(&self) -> &str {
        match self {
            Action::Order(o) => &o.trans_id,
            Action::Query(q) => &q.trans_id,
            Action::Cancel(c) => &c.trans_id,
        }
    }
}

/// A `<transactions>` document issued on behalf of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub account_id: String,
    pub actions: Vec<Action>,
}

/// Either request document, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "lowercase")]
pub enum Payload {
    Create(CreateRequest),
    Transaction(TransactionRequest),
}

impl Payload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Payload::Create(_) => RequestKind::Create,
            Payload::Transaction(_) => RequestKind::Transaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_create() -> CreateRequest {
        CreateRequest {
            elements: vec![
                CreateElement::Symbol(Symbol {
                    name: "SPY".to_string(),
                    accounts: vec![SymbolAccount {
                        id: "ACCT_0002".to_string(),
                        shares: 10,
                    }],
                }),
                CreateElement::Account(Account {
                    id: "ACCT_0001".to_string(),
                    balance: Decimal::new(123456, 2),
                }),
            ],
        }
    }

    #[test]
    fn test_request_kind_parse_and_display() {
        assert_eq!("create".parse::<RequestKind>(), Ok(RequestKind::Create));
        assert_eq!(
            "Transactions".parse::<RequestKind>(),
            Ok(RequestKind::Transaction)
        );
        assert!("order".parse::<RequestKind>().is_err());
        assert_eq!(RequestKind::Transaction.to_string(), "transaction");
    }

    #[test]
    fn test_create_request_accessors_keep_document_order() {
        let request = sample_create();

        assert_eq!(request.len(), 2);
        assert_eq!(request.accounts().count(), 1);
        assert_eq!(request.symbols().count(), 1);
        assert!(matches!(request.elements[0], CreateElement::Symbol(_)));
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = Payload::Create(sample_create());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["kind"], "create");
        assert_eq!(json["body"]["elements"][1]["type"], "account");
        assert_eq!(json["body"]["elements"][1]["balance"], "1234.56");
        assert_eq!(payload.kind(), RequestKind::Create);
    }
}
