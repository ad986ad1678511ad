//! Functions which export a compute module into a consumable form.

pub mod spv;
