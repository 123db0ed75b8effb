pub mod support;

mod selector_tests;
