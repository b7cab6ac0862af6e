pub mod assembler;
pub mod config;
pub mod filesystem;
pub mod headings;
pub mod html;
pub mod index;
pub mod links;
pub mod package;
pub mod render;
pub mod runtime;
pub mod sidebar;
pub mod toc;
