//! Core types and codecs for a SQLite administration interface.
//!
//! This crate holds everything that does not need a live connection:
//!
//! - [`TableMetadata`] and its parts ([`Column`], [`ForeignKey`], [`Index`],
//!   [`Trigger`], [`View`], [`PrimaryKey`]): plain records loaded from the
//!   catalog and handed to renderers.
//! - [`Value`] and [`Row`]: a generic typed row representation.
//! - The value codec ([`decode`], [`render_for_display`],
//!   [`render_for_input`]): form text to typed values and back.
//! - The primary-key codec ([`pk`]): reversible row tokens, including
//!   composite keys.
//! - Page arithmetic ([`Pagination`], [`PageRequest`]).
//!
//! # Example
//!
//! ```
//! use litebrowse_core::*;
//!
//! let columns = vec![
//!     Column::new("id", DeclaredType::Integer),
//!     Column::new("avatar", DeclaredType::Blob),
//! ];
//! let values = decode_fields(
//!     &columns,
//!     &[("avatar".to_string(), "YWJj".to_string())],
//! )
//! .unwrap();
//! assert_eq!(values[0].1, Value::Blob(b"abc".to_vec()));
//!
//! let key = PrimaryKey::Single("id".into());
//! let row: Row = [("id".to_string(), Value::Integer(9))].into_iter().collect();
//! assert_eq!(pk::encode(&row, &key).as_str(), "9");
//! ```

mod codec;
mod page;
pub mod pk;
mod types;
mod validate;

pub use codec::{
    DecodeError, DisplayValue, MAX_BLOB_DISPLAY, decode, render_for_display, render_for_input,
};
pub use page::{PageRequest, Pagination};
pub use pk::{KeyError, KeyPredicate, PkToken};
pub use types::*;
pub use validate::{FieldErrors, decode_fields, is_valid_identifier, quote_ident};
