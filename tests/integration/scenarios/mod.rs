mod end_to_end_tests;
mod shutdown_tests;
