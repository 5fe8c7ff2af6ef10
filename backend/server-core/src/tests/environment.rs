// The handoff variable of this process. Tests that touch the environment
// run serially.

use crate::error::handoff::HandoffError;
use crate::handoff::environment::{inherited_listeners, successor_variable};
use crate::handoff::{HANDOFF_ENV_VAR, ListenerRecord, ListenerSet};

use serial_test::serial;

fn set_handoff_variable(value: &str) {
    // SAFETY: serialized with every other test that reads or writes the
    // process environment.
    unsafe { std::env::set_var(HANDOFF_ENV_VAR, value) };
}

fn clear_handoff_variable() {
    // SAFETY: as above.
    unsafe { std::env::remove_var(HANDOFF_ENV_VAR) };
}

#[test]
#[serial]
fn given_no_variable_when_read_then_first_boot() {
    clear_handoff_variable();

    assert!(inherited_listeners().unwrap().is_empty());
}

/// **VALUE**: What a predecessor writes is what its successor reads.
#[test]
#[serial]
fn given_successor_variable_when_read_back_then_same_records() {
    // GIVEN: The variable a predecessor would pass on
    let set = ListenerSet::new(vec![
        ListenerRecord::new("tcp:0.0.0.0:8080", 3),
        ListenerRecord::new("tcp6:[::]:8080", 4),
    ]);
    let (name, value) = successor_variable(&set).unwrap();
    assert_eq!(name, HANDOFF_ENV_VAR);

    // WHEN: The successor reads its environment
    set_handoff_variable(&value);
    let inherited = inherited_listeners();
    clear_handoff_variable();

    // THEN: Same records
    assert_eq!(inherited.unwrap(), set);
}

#[test]
#[serial]
fn given_malformed_variable_when_read_then_startup_fails() {
    set_handoff_variable("tcp:8080");
    let result = inherited_listeners();
    clear_handoff_variable();

    assert!(matches!(
        result,
        Err(HandoffError::MalformedHandoffRecord { .. })
    ));
}
