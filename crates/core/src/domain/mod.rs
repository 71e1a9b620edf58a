pub mod agent;
pub mod appointment;
pub mod compliment;
pub mod conversation;
pub mod document;
