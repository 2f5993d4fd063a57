pub mod mv;
pub mod refs;
