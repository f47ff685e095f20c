pub mod completion;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod ports;
pub mod prd;
pub mod prompts;
pub mod questions;
pub mod rate_limit;

pub use completion::{
    ChatMessage, CompletionError, CompletionRequest, CompletionResult, CompletionService,
    ResponseFormat, Role, TextStream, Usage,
};
pub use domain::{
    AuthSession, GeneratedQuestion, NewProject, Project, ProjectDetails, ProjectPage,
    ProjectQuery, ProjectStatus, ProjectUpdate, Question, QuestionAnswer, SortField, SortOrder,
    User, UserCredentials,
};
pub use error::GenerationError;
pub use ports::{DatabaseService, PortError, PortResult, RateLimitEntry, RateLimitStore};
