//! Test utilities for IPC tests
//!
//! Helpers for the setup most IPC tests repeat: wiring two threads together
//! with a stream and placing buffers in a thread's address space.

use crate::{SimulatedKernel, Thread};
use core_types::{AccessError, Handle, MemoryPerms, PAGE_SIZE};
use ipc::UserBuffer;
use kernel_api::{KernelApi, KernelError};

/// Creates a stream and gives one lane to each thread
///
/// Returns the lane handle in `a`'s universe and the lane handle in `b`'s.
pub fn connect(a: &Thread, b: &Thread) -> Result<(Handle, Handle), KernelError> {
    let (lane0, lane1) = a.create_stream()?;
    let moved = a
        .process()
        .universe()
        .transfer(lane1, b.process().universe())?;
    a.close_descriptor(lane1)?;
    Ok((lane0, moved))
}

/// Two threads in separate processes, connected by a stream
pub fn connected_threads(
    kernel: &SimulatedKernel,
) -> Result<(Thread, Handle, Thread, Handle), KernelError> {
    let a = kernel.create_thread(&kernel.create_process());
    let b = kernel.create_thread(&kernel.create_process());
    let (lane_a, lane_b) = connect(&a, &b)?;
    Ok((a, lane_a, b, lane_b))
}

fn page_span(length: u64) -> u64 {
    length.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE
}

/// Maps zeroed read-write pages covering `length` bytes at `address`
pub fn map_zeroed(thread: &Thread, address: u64, length: u64) -> Result<UserBuffer, AccessError> {
    thread
        .process()
        .address_space()
        .map(address, page_span(length), MemoryPerms::read_write())?;
    Ok(UserBuffer::new(address, length))
}

/// Maps pages at `address` and fills them with `data`
pub fn map_buffer(thread: &Thread, address: u64, data: &[u8]) -> Result<UserBuffer, AccessError> {
    let buffer = map_zeroed(thread, address, data.len() as u64)?;
    thread.process().address_space().write_bytes(address, data)?;
    Ok(buffer)
}

/// Reads a buffer back out of a thread's address space
pub fn read_buffer(thread: &Thread, buffer: UserBuffer) -> Result<Vec<u8>, AccessError> {
    thread
        .process()
        .address_space()
        .read_bytes(buffer.address, buffer.length as usize)
}
