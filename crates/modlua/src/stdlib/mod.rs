// Core-adjacent standard libraries

pub mod basic;
pub mod coroutine;
pub mod math;
pub mod table;
