//! Command pools and command buffers.
//!
//! A pool is bound to the queue family of the queue it was created for and
//! allows per-buffer reset. Buffers are tracked by their owning pool so
//! destroying the pool releases every buffer allocated from it.

use ash::vk;

use crate::error::{RenderError, Result};
use crate::handle::{CommandBufferId, CommandPoolId, Pool, QueueId};

use super::VulkanDriver;

pub(crate) struct CommandPoolRecord {
    pub handle: vk::CommandPool,
    #[allow(dead_code)]
    pub queue_family: u32,
    pub buffers: Vec<CommandBufferId>,
}

pub(crate) struct CommandBufferRecord {
    pub handle: vk::CommandBuffer,
    #[allow(dead_code)]
    pub pool: CommandPoolId,
    recording: bool,
}

impl CommandBufferRecord {
    pub(crate) fn new(handle: vk::CommandBuffer, pool: CommandPoolId) -> Self {
        Self {
            handle,
            pool,
            recording: false,
        }
    }

    pub(crate) fn mark_begin(&mut self) {
        assert!(!self.recording, "command buffer already recording");
        self.recording = true;
    }

    pub(crate) fn mark_end(&mut self) {
        assert!(self.recording, "command buffer not recording");
        self.recording = false;
    }
}

/// Drop every buffer record owned by `pool` from the buffer arena.
pub(crate) fn release_pool_buffers(
    buffers: &mut Pool<CommandBufferRecord>,
    pool: &CommandPoolRecord,
) {
    for &buffer in &pool.buffers {
        buffers.remove(buffer.0);
    }
}

impl VulkanDriver {
    pub(crate) fn create_command_pool_impl(&mut self, queue: QueueId) -> Result<CommandPoolId> {
        let dev = self.device.as_ref().expect("no device selected");
        let queue_family = dev.queues[queue.0 as usize].family_index;

        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);

        let handle = unsafe { dev.device.create_command_pool(&create_info, None) }
            .map_err(RenderError::CommandPoolCreation)?;

        Ok(CommandPoolId(self.command_pools.insert(CommandPoolRecord {
            handle,
            queue_family,
            buffers: Vec::new(),
        })))
    }

    pub(crate) fn destroy_command_pool_impl(&mut self, pool: CommandPoolId) {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.command_pools.remove(pool.0);

        // The native pool frees its buffers with it; only the records need
        // releasing on our side.
        unsafe {
            dev.device.destroy_command_pool(record.handle, None);
        }
        release_pool_buffers(&mut self.command_buffers, &record);
    }

    pub(crate) fn create_command_buffer_impl(
        &mut self,
        pool: CommandPoolId,
    ) -> Result<CommandBufferId> {
        let dev = self.device.as_ref().expect("no device selected");
        let pool_record = self.command_pools.get_mut(pool.0);

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool_record.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let handles = unsafe { dev.device.allocate_command_buffers(&allocate_info) }
            .map_err(RenderError::CommandBufferAllocation)?;

        let buffer = CommandBufferId(
            self.command_buffers
                .insert(CommandBufferRecord::new(handles[0], pool)),
        );
        pool_record.buffers.push(buffer);
        Ok(buffer)
    }

    pub(crate) fn begin_command_buffer_impl(&mut self, command_buffer: CommandBufferId) -> Result<()> {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.command_buffers.get_mut(command_buffer.0);
        record.mark_begin();

        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { dev.device.begin_command_buffer(record.handle, &begin_info) }
            .map_err(RenderError::CommandRecording)
    }

    pub(crate) fn end_command_buffer_impl(&mut self, command_buffer: CommandBufferId) -> Result<()> {
        let dev = self.device.as_ref().expect("no device selected");
        let record = self.command_buffers.get_mut(command_buffer.0);
        record.mark_end();

        unsafe { dev.device.end_command_buffer(record.handle) }
            .map_err(RenderError::CommandRecording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_record() -> CommandBufferRecord {
        CommandBufferRecord::new(vk::CommandBuffer::null(), CommandPoolId(0))
    }

    #[test]
    fn begin_end_round_trip() {
        let mut record = buffer_record();
        record.mark_begin();
        record.mark_end();
        record.mark_begin();
        record.mark_end();
    }

    #[test]
    #[should_panic(expected = "already recording")]
    fn double_begin_aborts() {
        let mut record = buffer_record();
        record.mark_begin();
        record.mark_begin();
    }

    #[test]
    #[should_panic(expected = "not recording")]
    fn end_without_begin_aborts() {
        let mut record = buffer_record();
        record.mark_end();
    }

    #[test]
    fn destroying_a_pool_releases_exactly_its_buffers() {
        let mut buffers: Pool<CommandBufferRecord> = Pool::default();
        let own_a = CommandBufferId(buffers.insert(buffer_record()));
        let foreign = CommandBufferId(buffers.insert(CommandBufferRecord::new(
            vk::CommandBuffer::null(),
            CommandPoolId(1),
        )));
        let own_b = CommandBufferId(buffers.insert(buffer_record()));

        let pool = CommandPoolRecord {
            handle: vk::CommandPool::null(),
            queue_family: 0,
            buffers: vec![own_a, own_b],
        };
        release_pool_buffers(&mut buffers, &pool);

        assert_eq!(buffers.len(), 1);
        assert!(buffers.contains(foreign.0));
        assert!(!buffers.contains(own_a.0));
        assert!(!buffers.contains(own_b.0));
    }
}
