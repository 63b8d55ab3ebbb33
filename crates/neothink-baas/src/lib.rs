//! Backend-as-a-service access for the Neothink edge service.
//!
//! [`TableStore`] and [`AuthProvider`] are the seams; [`RestBaas`] talks to a
//! hosted project and [`MemoryBaas`] keeps everything in process.
//! [`ClientFactory`] hands out one client per platform.

pub mod error;
pub mod factory;
pub mod memory;
pub mod query;
pub mod rest;
pub mod store;

pub use error::{Error, Result};
pub use factory::{BaasClient, ClientFactory, ServiceStores};
pub use memory::{INCREMENT_RATE_LIMIT, INCREMENT_RATE_LIMIT_SQL, MemoryBaas};
pub use query::{Direction, Filter, Op, Query};
pub use rest::RestBaas;
pub use store::{
    AuthProvider, Credentials, Session, SignUp, TableStore, User, UserUpdate, decode_first,
    decode_rows, encode_row, fetch, insert_one,
};
