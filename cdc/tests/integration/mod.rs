mod processor_test;
mod reconcile_test;
