pub mod age;
pub mod form;
pub mod member;
pub mod product;
pub mod verification;
