//! REST clients for the back-office services

pub mod client;
pub mod history_repository;
pub mod numbers_client;
pub mod report_client;
pub mod token_client;

pub use client::ApiClient;
pub use history_repository::HttpCallHistoryRepository;
pub use numbers_client::HttpNumberInventory;
pub use report_client::HttpReportSubmitter;
pub use token_client::HttpTokenIssuer;
