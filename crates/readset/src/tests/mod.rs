mod read_options_tests;
