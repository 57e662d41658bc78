// Turns device buffers into fixed-size 16 kHz mono frames
//
// Devices deliver interleaved buffers of arbitrary length, channel count and
// rate. The assembler downmixes to mono, resamples to the target rate and
// re-blocks the result so every emitted frame has exactly `frame_size`
// samples. Leftover samples carry over to the next buffer.

/// Stateful linear-interpolation resampler
#[derive(Debug, Clone)]
pub struct LinearResampler {
    source_rate: u32,
    target_rate: u32,
    /// Input samples consumed per output sample
    step: f64,
    /// Read position relative to the carried-over sample
    position: f64,
    /// Last input sample of the previous buffer
    carry: Option<f32>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        // An unknown rate on either side passes samples through untouched
        let step = if source_rate == 0 || target_rate == 0 {
            1.0
        } else {
            source_rate as f64 / target_rate as f64
        };

        Self {
            source_rate,
            target_rate,
            step,
            position: 0.0,
            carry: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate || self.source_rate == 0 || self.target_rate == 0
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }

        let mut buffer = Vec::with_capacity(input.len() + 1);
        if let Some(sample) = self.carry {
            buffer.push(sample);
        }
        buffer.extend_from_slice(input);

        if buffer.len() < 2 {
            self.carry = buffer.last().copied();
            return Vec::new();
        }

        let mut output = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        let last_index = buffer.len() - 1;

        while self.position < last_index as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let sample = buffer[index] * (1.0 - frac) + buffer[index + 1] * frac;
            output.push(sample);
            self.position += self.step;
        }

        // The last sample becomes index 0 of the next buffer
        self.position -= last_index as f64;
        self.carry = Some(buffer[last_index]);

        output
    }
}

/// Average interleaved channels down to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().sum();
            (sum / frame.len() as f32).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Re-blocks device audio into fixed-size mono frames
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    channels: usize,
    frame_size: usize,
    resampler: LinearResampler,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(channels: u16, source_rate: u32, target_rate: u32, frame_size: usize) -> Self {
        Self {
            channels: channels.max(1) as usize,
            frame_size: frame_size.max(1),
            resampler: LinearResampler::new(source_rate, target_rate),
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Feed one interleaved device buffer; `emit` runs once per completed frame
    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(&[f32])) -> usize {
        let mono = downmix(interleaved, self.channels);
        let resampled = self.resampler.process(&mono);
        self.pending.extend_from_slice(&resampled);

        let mut emitted = 0;
        let mut offset = 0;
        while self.pending.len() - offset >= self.frame_size {
            emit(&self.pending[offset..offset + self.frame_size]);
            offset += self.frame_size;
            emitted += 1;
        }
        self.pending.drain(..offset);

        emitted
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
