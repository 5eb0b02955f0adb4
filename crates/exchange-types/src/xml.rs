//! XML rendering for request documents.
//!
//! The output follows the grammar the exchange server parses:
//!
//! ```text
//! <create>
//!   <account id="ACCT_0001" balance="1000.00"/>
//!   <symbol sym="SPY"><account id="ACCT_0002">100</account></symbol>
//! </create>
//!
//! <transactions id="ACCT_0001">
//!   <order sym="SPY" amount="-20" limit="42.50"/>
//!   <query id="17"/>
//!   <cancel id="17"/>
//! </transactions>
//! ```
//!
//! Rendering is a pure function of the structured request; children are
//! written in the order they appear in the request, with no whitespace
//! between them.

use crate::request::{Action, CreateElement, CreateRequest, Payload, TransactionRequest};
use std::fmt::Write;
use thiserror::Error;

/// Declaration written before every document.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Errors that can occur while rendering a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A value contains a character that XML 1.0 cannot represent.
    #[error("Value for '{field}' contains a character not allowed in XML: {value:?}")]
    InvalidCharacter { field: &'static str, value: String },
}

/// Turns structured requests into XML text.
pub trait Renderer: Send + Sync {
    fn render(&self, payload: &Payload) -> Result<String, RenderError>;
}

/// Default renderer producing the server's request grammar.
#[derive(Debug, Clone, Copy)]
pub struct XmlRenderer {
    /// Prefix documents with [`XML_DECLARATION`].
    pub declaration: bool,
}

impl Default for XmlRenderer {
    fn default() -> Self {
        Self { declaration: true }
    }
}

impl Renderer for XmlRenderer {
    fn render(&self, payload: &Payload) -> Result<String, RenderError> {
        let mut out = String::new();
        if self.declaration {
            out.push_str(XML_DECLARATION);
        }
        match payload {
            Payload::Create(create) => write_create(&mut out, create)?,
            Payload::Transaction(tx) => write_transaction(&mut out, tx)?,
        }
        Ok(out)
    }
}

/// Render a payload with the default renderer.
pub fn render_payload(payload: &Payload) -> Result<String, RenderError> {
    XmlRenderer::default().render(payload)
}

/// Render one top-level `<create>` child.
pub fn render_create_element(element: &CreateElement) -> Result<String, RenderError> {
    let mut out = String::new();
    write_create_element(&mut out, element)?;
    Ok(out)
}

/// Render one top-level `<transactions>` child.
pub fn render_action(action: &Action) -> Result<String, RenderError> {
    let mut out = String::new();
    write_action(&mut out, action)?;
    Ok(out)
}

fn write_create(out: &mut String, create: &CreateRequest) -> Result<(), RenderError> {
    out.push_str("<create>");
    for element in &create.elements {
        write_create_element(out, element)?;
    }
    out.push_str("</create>");
    Ok(())
}

fn write_create_element(out: &mut String, element: &CreateElement) -> Result<(), RenderError> {
    match element {
        CreateElement::Account(account) => {
            out.push_str("<account id=\"");
            push_escaped(out, "account.id", &account.id)?;
            // Writing into a String cannot fail.
            let _ = write!(out, "\" balance=\"{}\"/>", account.balance);
        }
        CreateElement::Symbol(symbol) => {
            out.push_str("<symbol sym=\"");
            push_escaped(out, "symbol.sym", &symbol.name)?;
            out.push_str("\">");
            for position in &symbol.accounts {
                out.push_str("<account id=\"");
                push_escaped(out, "symbol.account.id", &position.id)?;
                let _ = write!(out, "\">{}</account>", position.shares);
            }
            out.push_str("</symbol>");
        }
    }
    Ok(())
}

fn write_transaction(out: &mut String, tx: &TransactionRequest) -> Result<(), RenderError> {
    out.push_str("<transactions id=\"");
    push_escaped(out, "transactions.id", &tx.account_id)?;
    out.push_str("\">");
    for action in &tx.actions {
        write_action(out, action)?;
    }
    out.push_str("</transactions>");
    Ok(())
}

fn write_action(out: &mut String, action: &Action) -> Result<(), RenderError> {
    match action {
        Action::Order(order) => {
            out.push_str("<order sym=\"");
            push_escaped(out, "order.sym", &order.symbol)?;
            let _ = write!(
                out,
                "\" amount=\"{}\" limit=\"{}\"/>",
                order.amount, order.limit
            );
        }
        Action::Query(query) => {
            out.push_str("<query id=\"");
            push_escaped(out, "query.id", &query.trans_id)?;
            out.push_str("\"/>");
        }
        Action::Cancel(cancel) => {
            out.push_str("<cancel id=\"");
            push_escaped(out, "cancel.id", &cancel.trans_id)?;
            out.push_str("\"/>");
        }
    }
    Ok(())
}

/// Append `value` escaped for use inside a double-quoted attribute.
fn push_escaped(out: &mut String, field: &'static str, value: &str) -> Result<(), RenderError> {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => {
                let _ = write!(out, "&#{};", c as u32);
            }
            c if is_xml_char(c) => out.push(c),
            _ => {
                return Err(RenderError::InvalidCharacter {
                    field,
                    value: value.to_string(),
                })
            }
        }
    }
    Ok(())
}

fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Account, Cancel, Order, Query, Symbol, SymbolAccount};
    use rust_decimal::Decimal;

    #[test]
    fn test_render_create_document() {
        let create = CreateRequest {
            elements: vec![
                CreateElement::Account(Account {
                    id: "ACCT_0001".to_string(),
                    balance: Decimal::new(100000, 2),
                }),
                CreateElement::Symbol(Symbol {
                    name: "SPY".to_string(),
                    accounts: vec![
                        SymbolAccount {
                            id: "ACCT_0002".to_string(),
                            shares: 100,
                        },
                        SymbolAccount {
                            id: "ACCT_0003".to_string(),
                            shares: 5,
                        },
                    ],
                }),
            ],
        };

        let xml = render_payload(&Payload::Create(create)).unwrap();

        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <create><account id=\"ACCT_0001\" balance=\"1000.00\"/>\
             <symbol sym=\"SPY\"><account id=\"ACCT_0002\">100</account>\
             <account id=\"ACCT_0003\">5</account></symbol></create>"
        );
    }

    #[test]
    fn test_render_transaction_document() {
        let tx = TransactionRequest {
            account_id: "ACCT_0042".to_string(),
            actions: vec![
                Action::Cancel(Cancel {
                    trans_id: "9".to_string(),
                }),
                Action::Order(Order {
                    symbol: "AAPL".to_string(),
                    amount: -20,
                    limit: Decimal::new(4250, 2),
                    trans_id: "31".to_string(),
                }),
                Action::Query(Query {
                    trans_id: "31".to_string(),
                }),
            ],
        };

        let renderer = XmlRenderer { declaration: false };
        let xml = renderer.render(&Payload::Transaction(tx)).unwrap();

        assert_eq!(
            xml,
            "<transactions id=\"ACCT_0042\"><cancel id=\"9\"/>\
             <order sym=\"AAPL\" amount=\"-20\" limit=\"42.50\"/>\
             <query id=\"31\"/></transactions>"
        );
    }

    #[test]
    fn test_render_empty_create() {
        let renderer = XmlRenderer { declaration: false };
        let xml = renderer
            .render(&Payload::Create(CreateRequest::default()))
            .unwrap();
        assert_eq!(xml, "<create></create>");
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let action = Action::Query(Query {
            trans_id: "a<b&\"c\"".to_string(),
        });
        assert_eq!(
            render_action(&action).unwrap(),
            "<query id=\"a&lt;b&amp;&quot;c&quot;\"/>"
        );
    }

    #[test]
    fn test_control_characters_are_rejected() {
        let element = CreateElement::Account(Account {
            id: "bad\u{1}id".to_string(),
            balance: Decimal::ONE,
        });

        let err = render_create_element(&element).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidCharacter {
                field: "account.id",
                ..
            }
        ));
    }
}
