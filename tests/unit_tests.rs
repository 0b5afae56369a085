//! Component-level tests driven through the public API.

mod unit;
