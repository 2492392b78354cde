pub mod api;
pub mod auth;
pub mod catalog;
pub mod client_state;
pub mod config;
pub mod database;
pub mod display_name_cache;
pub mod errors;
pub mod logging;
pub mod models;
pub mod question_selector;
pub mod quiz_service;
pub mod scoring;
pub mod store;
pub mod supabase;


pub use auth::{AuthError, AuthProvider, SupabaseAuth};
pub use config::Config;
pub use database::Database;
pub use display_name_cache::DisplayNameCache;
pub use errors::*;
pub use models::*;
pub use question_selector::{select_questions, SelectionError};
pub use quiz_service::{QuizService, ServiceError};
pub use store::{QuestionSource, QuizStore, StoreError};
pub use supabase::SupabaseStore;
