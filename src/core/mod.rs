// Core types shared by every layer: errors, values, identifiers, outcomes

pub mod error;
pub mod identifier;
pub mod outcome;
pub mod value;

pub use error::SqlError;
pub use identifier::Identifier;
pub use outcome::{GIVE_UP_ATTEMPTS, Outcome, RetryPolicy};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(3.5).to_string(), "3.5");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_string(), "x'dead'");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(7_i32), Value::Integer(7));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(2.5)), Value::Real(2.5));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Text("hello".to_string()).as_int(), None);
        assert_eq!(Value::Text("hello".to_string()).as_text(), Some("hello"));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_identifier_valid() {
        let ident = Identifier::new("report_hosts").unwrap();
        assert_eq!(ident.as_str(), "report_hosts");
        assert_eq!(ident.to_string(), "\"report_hosts\"");
        assert!(Identifier::try_from("_tmp1").is_ok());
    }

    #[test]
    fn test_identifier_rejects_injection() {
        assert!(matches!(
            Identifier::new("tasks; DROP TABLE users"),
            Err(SqlError::InvalidIdentifier(_))
        ));
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("1abc").is_err());
        assert!(Identifier::new("a\"b").is_err());
    }
}
