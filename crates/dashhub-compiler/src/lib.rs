//! # dashhub-compiler
//!
//! Turns a declarative [`Dashboard`] into the flat set of endpoints and
//! element scripts the hub serves. Writers are selected per component kind
//! through a [`WriterTable`]; unknown kinds contribute nothing.

#![deny(unsafe_code)]

pub mod compiler;
pub mod component;
pub mod parts;
pub mod writers;

pub use compiler::{Compiler, DashboardApp, compile};
pub use component::{Component, Dashboard, Navigation, PAGE_KIND, Page};
pub use parts::ComponentParts;
pub use writers::{ELEMENT_KIND, Writer, WriterTable};
