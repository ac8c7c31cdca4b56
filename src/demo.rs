//! Built-in test classes
//!
//! The classes the `run` command can resolve, used for trying out a server.

use anyhow::ensure;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{TestCase, TestRegistry, TestSuite};

pub fn registry() -> TestRegistry {
    TestRegistry::new()
        .with("demo.Arithmetic", || Ok(Arc::new(arithmetic())))
        .with("demo.Assertions", || Ok(Arc::new(assertions())))
        .with("demo.Slow", || Ok(Arc::new(slow())))
        .with("demo.Single", || {
            Ok(Arc::new(TestCase::new("single", || Ok(()))))
        })
}

fn arithmetic() -> TestSuite {
    TestSuite::new("demo.Arithmetic")
        .case("adds", || {
            let sum: u32 = [2, 2].iter().sum();
            ensure!(sum == 4, "addition is broken");
            Ok(())
        })
        .case("multiplies", || {
            let product: u32 = [6, 7].iter().product();
            ensure!(product == 42, "multiplication is broken");
            Ok(())
        })
        .case("divides", || {
            let quotient = 84_u32.checked_div(2);
            ensure!(quotient == Some(42), "division is broken");
            Ok(())
        })
}

fn assertions() -> TestSuite {
    TestSuite::new("demo.Assertions")
        .case("passes", || Ok(()))
        .case("fails", || {
            let actual: Vec<&str> = "alpha".split(',').collect();
            assert_eq!(actual, ["alpha", "beta"], "lists differ");
            Ok(())
        })
        .case("errors", || {
            let _port: u16 = "seventy".parse()?;
            Ok(())
        })
}

fn slow() -> TestSuite {
    (1..=3).fold(TestSuite::new("demo.Slow"), |suite, i| {
        suite.case(format!("waits{i}"), move || {
            std::thread::sleep(Duration::from_millis(500 * i));
            Ok(())
        })
    })
}
