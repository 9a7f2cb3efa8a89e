pub mod triplets;
