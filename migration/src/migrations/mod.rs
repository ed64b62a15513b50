pub mod m202510190001_create_courses;
pub mod m202510190002_create_exercises;
pub mod m202510190003_create_participations;
pub mod m202510190004_create_submissions;
pub mod m202510190005_create_plagiarism_results;
pub mod m202510190006_create_plagiarism_check_locks;
