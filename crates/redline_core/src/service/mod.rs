//! Use-case services over the document store.

pub mod review_service;
