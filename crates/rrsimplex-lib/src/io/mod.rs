pub mod tabular;
pub mod text;
