pub mod check_tag;
pub mod run;
