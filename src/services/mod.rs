// src/services/mod.rs
pub mod completion;
pub mod image_processor;
pub mod image_service;
pub mod llm_service;
pub mod reply_parser;
pub mod telegram;
