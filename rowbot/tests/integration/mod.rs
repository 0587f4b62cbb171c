mod binary_columns_test;
mod job_test;
mod shutdown_test;
mod support;
