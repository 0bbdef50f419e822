pub mod ast;
pub mod config;
pub mod draft;
pub mod error;
pub mod grammar;
pub mod parser;
pub mod render;
pub mod session;
pub mod store;
pub mod validate;


pub use ast::{Action, ActionKind, Condition, Operator, Rule, Value};
pub use draft::RuleDraft;
pub use error::{
    IncompleteRuleError, IndexError, ParseError, RuleError, SubmitError, UnavailableError,
    ValidationError,
};
pub use grammar::{GrammarCatalog, ValueDomain};
pub use parser::{deserialize, parse_rule};
pub use render::serialize;
pub use session::{next_rule_name, AuthoringSession};
pub use store::RuleStoreClient;
pub use validate::validate;
