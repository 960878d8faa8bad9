mod closure_test;
mod sync_test;
