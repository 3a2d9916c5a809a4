mod build_file_tests;
