pub mod course;
pub mod exercise;
pub mod participation;
pub mod plagiarism_check_lock;
pub mod plagiarism_comparison;
pub mod plagiarism_result;
pub mod submission;
