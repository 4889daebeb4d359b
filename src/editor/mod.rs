//! The editor window: an editable form that flips into a read-only
//! preview of the finished invoice.

mod state;
mod view;

pub use view::run;
