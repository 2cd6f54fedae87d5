pub mod envelope;
pub mod fanout;
pub mod handler;
pub mod registry;
pub mod server;
pub mod subscriber;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testutil;
