//! Concrete providers against mock HTTP servers, driven through the dispatcher.

mod providers;
