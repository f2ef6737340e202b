//! Helper items to assist the working of HkSym.

pub mod geometry;
pub mod template_systems;
