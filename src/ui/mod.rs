pub mod chat_loop;
pub mod keybindings;
pub mod lifecycle;
pub mod renderer;
pub mod theme;
