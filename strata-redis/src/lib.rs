#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod connection;
pub mod error;
pub mod store;

#[doc(inline)]
pub use crate::connection::{ConnectionMode, SingleConfig};
#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::store::{RedisStore, RedisStoreBuilder};

#[cfg(feature = "cluster")]
#[doc(inline)]
pub use crate::connection::ClusterConfig;
