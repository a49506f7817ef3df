use d3d12_hal::{
    native::soft::{Command, JournalEntry},
    ComputePassDescriptor, DeviceError, RenderPassDescriptor,
};

use crate::common::initialize_test;

fn allocator_resets(journal: &[JournalEntry]) -> usize {
    journal
        .iter()
        .filter(|entry| **entry == JournalEntry::ResetCommandAllocator)
        .count()
}

#[test]
fn ending_an_idle_encoder_fails() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    assert!(!encoder.is_recording());
    assert!(matches!(
        encoder.end_encoding(),
        Err(DeviceError::NotRecording)
    ));
    assert_eq!(encoder.discard_encoding(), Err(DeviceError::NotRecording));
    assert_eq!(
        encoder.insert_debug_marker("nothing to mark"),
        Err(DeviceError::NotRecording)
    );
}

#[test]
fn beginning_twice_fails() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    assert_eq!(
        encoder.begin_encoding(None),
        Err(DeviceError::AlreadyRecording)
    );
    assert!(encoder.is_recording());
    assert!(encoder.end_encoding().is_ok());
}

#[test]
fn encoders_can_be_reused() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();

    encoder.begin_encoding(Some("first")).unwrap();
    encoder.insert_debug_marker("one").unwrap();
    let first = encoder.end_encoding().unwrap();
    assert!(first.raw().is_closed());
    assert_eq!(first.raw().name().as_deref(), Some("first"));

    encoder.begin_encoding(Some("second")).unwrap();
    let second = encoder.end_encoding().unwrap();
    assert!(second.raw().commands().is_empty());

    ctx.submit_and_wait(&[&first, &second]);
    encoder.reset_all([first, second]);

    // Recycled lists come back empty.
    encoder.begin_encoding(Some("third")).unwrap();
    let third = encoder.end_encoding().unwrap();
    assert!(third.raw().commands().is_empty());
    assert_eq!(third.raw().name().as_deref(), Some("third"));
}

#[test]
fn every_begin_resets_the_allocator_once() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    ctx.device.raw().clear_journal();

    for _ in 0..3 {
        encoder.begin_encoding(None).unwrap();
        let cmd_buf = encoder.end_encoding().unwrap();
        encoder.reset_all([cmd_buf]);
    }
    assert_eq!(allocator_resets(&ctx.device.raw().journal()), 3);

    // A rejected begin must not touch the allocator.
    encoder.begin_encoding(None).unwrap();
    ctx.device.raw().clear_journal();
    assert!(encoder.begin_encoding(None).is_err());
    assert_eq!(allocator_resets(&ctx.device.raw().journal()), 0);
}

#[test]
fn discarded_work_is_not_returned() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    encoder.begin_debug_marker("dropped").unwrap();
    encoder.discard_encoding().unwrap();

    assert!(!encoder.is_recording());
    assert!(matches!(
        encoder.end_encoding(),
        Err(DeviceError::NotRecording)
    ));

    encoder.begin_encoding(None).unwrap();
    let cmd_buf = encoder.end_encoding().unwrap();
    assert!(cmd_buf.raw().commands().is_empty());
}

#[test]
fn debug_markers_are_recorded() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    encoder.begin_debug_marker("group").unwrap();
    encoder.insert_debug_marker("marker").unwrap();
    encoder.end_debug_marker().unwrap();
    let cmd_buf = encoder.end_encoding().unwrap();

    assert_eq!(
        cmd_buf.raw().commands(),
        vec![
            Command::BeginEvent("group".to_string()),
            Command::SetMarker("marker".to_string()),
            Command::EndEvent,
        ]
    );
}

#[test]
fn passes_need_a_recording_encoder() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    assert!(matches!(
        encoder.begin_compute_pass(&ComputePassDescriptor::default()),
        Err(DeviceError::NotRecording)
    ));
    assert!(matches!(
        encoder.begin_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: &[],
            depth_stencil_attachment: None,
        }),
        Err(DeviceError::NotRecording)
    ));
}

#[test]
fn labelled_passes_are_wrapped_in_events() {
    let ctx = initialize_test();
    let mut encoder = ctx.device.create_command_encoder().unwrap();
    encoder.begin_encoding(None).unwrap();
    {
        let mut pass = encoder
            .begin_compute_pass(&ComputePassDescriptor {
                label: Some("compute"),
            })
            .unwrap();
        pass.insert_debug_marker("inside");
    }
    let cmd_buf = encoder.end_encoding().unwrap();

    assert_eq!(
        cmd_buf.raw().commands(),
        vec![
            Command::BeginEvent("compute".to_string()),
            Command::SetMarker("inside".to_string()),
            Command::EndEvent,
        ]
    );
}

#[test]
fn destroying_encoders_updates_the_counters() {
    let ctx = initialize_test();
    let encoder = ctx.device.create_command_encoder().unwrap();
    assert_eq!(ctx.device.counters().command_encoders.read(), 1);
    ctx.device.destroy_command_encoder(encoder);
    assert_eq!(ctx.device.counters().command_encoders.read(), 0);
}
