//! Scenario tests for the controller and stream client, driven through the
//! scripted doubles in `crate::testing`.
