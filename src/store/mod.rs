//! On-disk JSON persistence shared by the mail cache and the tag store.

pub mod json;
