//! Parser and visitor for AIP-160 list filter expressions.
//!
//! ```
//! use aipfilter::dsl::{Visitor, Member, parse, visit};
//!
//! struct Fields(Vec<String>);
//!
//! impl Visitor for Fields {
//!     type Error = std::convert::Infallible;
//!
//!     fn visit_member(&mut self, member: &Member) -> Result<(), Self::Error> {
//!         self.0.push(member.to_string());
//!         Ok(())
//!     }
//! }
//!
//! let filter = parse("book.author = Tolkien AND NOT archived").unwrap();
//! let mut fields = Fields(Vec::new());
//! visit(&filter, &mut fields).unwrap();
//! assert_eq!(fields.0, vec!["book.author", "archived"]);
//! ```

pub mod dsl;
