//! WAV file source node and writer helper.
//!
//! The source decodes the whole file up front (16-bit integer or
//! 32-bit float PCM) and serves it as a finite, seekable node. File
//! channel 0 plays as LEFT and channel 1 as RIGHT; output channels
//! with no file counterpart come out silent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::context::{ChannelName, Context};
use crate::error::{Error, Result};
use crate::node::{node_ref, Base, Node, NodeRef};
use crate::plugin::{Hints, MetaText, Param, ParamKind, ParamScheme, ParamSet, Plugin, PluginFlags};
use crate::stream::Stream;
use crate::types::{Count, Pcm};
use crate::world::Env;

/// Key of the `filename` init parameter.
pub const FILENAME_KEY: usize = 0;

/// A finite source backed by a decoded WAV file.
#[derive(Debug)]
pub struct WavSource {
    base: Base,
    path: PathBuf,
    sample_rate: u32,
    channels: Vec<Vec<Pcm>>,
}

impl WavSource {
    /// Decode `path` into memory.
    pub fn open(ctx: &Context, path: &Path) -> Result<WavSource> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| Error::System(format!("opening {}: {e}", path.display())))?;
        let spec = reader.spec();

        let interleaved: Vec<Pcm> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::System(format!("decoding {}: {e}", path.display())))?,
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as Pcm / 32768.0))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::System(format!("decoding {}: {e}", path.display())))?,
            (format, bits) => {
                return Err(Error::System(format!(
                    "unsupported sample format {format:?}/{bits} in {}",
                    path.display()
                )))
            }
        };

        let nr_channels = spec.channels.max(1) as usize;
        let mut channels = vec![Vec::with_capacity(interleaved.len() / nr_channels); nr_channels];
        for (i, sample) in interleaved.into_iter().enumerate() {
            channels[i % nr_channels].push(sample);
        }

        if spec.sample_rate as f64 != ctx.samplerate() {
            warn!(
                file_rate = spec.sample_rate,
                ambient_rate = ctx.samplerate(),
                "sample rate mismatch; file plays unresampled"
            );
        }
        debug!(path = %path.display(), frames = channels[0].len(), "loaded wav file");

        Ok(WavSource {
            base: Base::new(ctx),
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel.
    pub fn frames(&self) -> Count {
        self.channels.first().map(|c| c.len() as Count).unwrap_or(0)
    }

}

impl Node for WavSource {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(WavSource {
            base: Base::new(ctx),
            path: self.path.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels.clone(),
        }))
    }

    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        _input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count> {
        let Some(out) = output else {
            return Err(Error::NoEntity);
        };

        let offset = self.base.offset;
        let total = self.frames();
        if offset >= total {
            return Err(Error::Silence);
        }
        let n = count.min(total - offset);

        let mut positions: BTreeMap<ChannelName, usize> = BTreeMap::new();
        let channels = &self.channels;
        let lookup = |name: ChannelName| -> Option<usize> {
            let idx = match name {
                ChannelName::Left => 0,
                ChannelName::Right => 1,
                _ => return None,
            };
            (idx < channels.len()).then_some(idx)
        };

        Ok(out.chunkfuncify(ctx, n, &mut |d, _, name| {
            let Some(idx) = lookup(name) else {
                return Err(Error::Silence);
            };
            let position = positions.entry(name).or_insert(offset as usize);
            let len = d.len();
            d.copy_from_slice(&channels[idx][*position..*position + len]);
            *position += len;
            Ok(len as Count)
        }))
    }

    fn length(&self, _ctx: &Context) -> Count {
        self.frames()
    }
}

/// Write interleaved samples as a 16-bit PCM WAV file.
pub fn write_wav(
    path: &Path,
    samples: &[Pcm],
    channels: u16,
    sample_rate: u32,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| Error::System(format!("creating {}: {e}", path.display())))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * 32767.0) as i16)
            .map_err(|e| Error::System(format!("writing sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::System(format!("finalising {}: {e}", path.display())))?;
    Ok(())
}

/// The `builtin::wavfile` plugin descriptor.
pub fn plugin() -> Plugin {
    Plugin {
        metatext: MetaText {
            identifier: "builtin::wavfile",
            category: "Sources::File",
            description: "WAV file reader",
            copyright: "",
            url: "",
            authors: Vec::new(),
        },
        flags: PluginFlags {
            seekable: true,
            cacheable: true,
            ..PluginFlags::default()
        },
        init_scheme: vec![ParamScheme {
            name: "filename",
            description: "Path of the WAV file to read",
            kind: ParamKind::Str,
            constraint: Default::default(),
            hints: Hints {
                filename: true,
                ..Hints::default()
            },
        }],
        init: wavfile_init,
        process_scheme: Vec::new(),
        suggest: None,
    }
}

fn wavfile_init(env: &mut Env, params: &ParamSet) -> Result<NodeRef> {
    let path = params
        .get(&FILENAME_KEY)
        .and_then(Param::as_str)
        .ok_or(Error::NoEntity)?
        .to_owned();
    Ok(node_ref(WavSource::open(env, Path::new(&path))?))
}
