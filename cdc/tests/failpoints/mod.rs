mod processor_test;
