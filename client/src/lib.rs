//! # Snake Terminal Client
//!
//! A headless front-end for the snake node library. It hosts or joins a game
//! through a [`node::Session`], prints every applied snapshot as a text grid
//! with a scoreboard, and turns lines typed on stdin into steering commands.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines into commands:
//! - `w`/`a`/`s`/`d` or `up`/`left`/`down`/`right` to steer
//! - `x` to leave the current game, `q` to quit
//!
//! ### Rendering Module (`rendering`)
//! Draws the field and the scoreboard as plain text.

pub mod input;
pub mod rendering;
