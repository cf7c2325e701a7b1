// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod columns;
pub mod error;
pub mod ids;
pub mod model;
pub mod nav;
pub mod overlay;
pub mod session;
pub mod source;
pub mod store;
pub mod table;

pub use columns::*;
pub use error::*;
pub use ids::*;
pub use model::*;
pub use nav::*;
pub use overlay::*;
pub use session::*;
pub use source::*;
pub use store::*;
pub use table::*;
