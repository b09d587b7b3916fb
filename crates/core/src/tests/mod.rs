mod degradation_tests;
mod integration_tests;

pub(crate) mod support;
