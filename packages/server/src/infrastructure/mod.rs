//! Infrastructure layer: concrete collaborators and wire formats.

pub mod auth;
pub mod dto;
pub mod repository;
