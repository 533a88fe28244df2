use fail::FailScenario;

use crate::failpoints::{DISPATCHER__BEFORE_PUT, STAGE_WORKER__BEFORE_TRANSFORM};

/// Fail points armed for as long as the value lives.
///
/// Holding the [`FailScenario`] serializes every test arming fail points in the binary. The
/// armed fail points are turned off again on drop.
pub struct ArmedFailpoints<'a> {
    _scenario: FailScenario<'a>,
    armed: Vec<&'static str>,
}

impl<'a> ArmedFailpoints<'a> {
    /// Arms each fail point with its `fail` action, e.g. `"2*return->off"`.
    ///
    /// # Panics
    ///
    /// Panics if an action cannot be parsed.
    pub fn arm(actions: &[(&'static str, &str)]) -> ArmedFailpoints<'a> {
        let scenario = FailScenario::setup();

        let mut armed = Vec::with_capacity(actions.len());
        for (name, action) in actions {
            if let Err(err) = fail::cfg(*name, action) {
                panic!("invalid action `{action}` for fail point `{name}`: {err}");
            }
            armed.push(*name);
        }

        Self {
            _scenario: scenario,
            armed,
        }
    }

    /// Fails the transform of the first `items` items reaching any stage worker.
    pub fn failing_transforms(items: usize) -> ArmedFailpoints<'a> {
        Self::arm(&[(
            STAGE_WORKER__BEFORE_TRANSFORM,
            &format!("{items}*return->off"),
        )])
    }

    /// Lets the dispatcher put `items` items on the first queue, then fails it.
    pub fn failing_dispatch_after(items: usize) -> ArmedFailpoints<'a> {
        Self::arm(&[(DISPATCHER__BEFORE_PUT, &format!("{items}*off->return"))])
    }

    /// Names of the armed fail points.
    pub fn armed(&self) -> &[&'static str] {
        &self.armed
    }
}

impl Drop for ArmedFailpoints<'_> {
    fn drop(&mut self) {
        for name in &self.armed {
            fail::remove(name);
        }
    }
}
