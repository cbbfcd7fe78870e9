// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

// Own test binary: installs the process-wide subscriber.

use log_shipper::logging;

#[test]
fn test_init_forwards_log_records() {
    logging::init("info").unwrap();

    assert_ne!(log::max_level(), log::LevelFilter::Off);
    assert!(log::log_enabled!(target: "rdkafka::client", log::Level::Warn));
    assert!(logging::init("info").is_err());
}
