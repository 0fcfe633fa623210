pub mod atom;
pub mod cell;
pub mod element;
pub mod system;
