//! Core data model: the canonical mail entity, its flat record form, and
//! subject tag extraction.

pub mod mail;
pub mod record;
pub mod subject;
