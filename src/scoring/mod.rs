// The scoring domain: rule catalog, event engine, and standings.

pub mod engine;
pub mod rules;
pub mod standings;
