//! Line commands read from stdin
//!
//! Lanes, slots and scenes are numbered from 1 here and converted to the
//! engine's zero-based indices.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use stemdeck_audio::{
    AudioCommand, DeckId, JumpUnit, LaneParam, MixerParam, Oscillator, PatchParam, SceneBank, SynthCommand,
};

/// What a line asks the application to do
#[derive(Debug, Clone)]
pub enum Input {
    Engine(AudioCommand),
    Load(DeckId, PathBuf),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
transport: play|stop <deck> | seek <deck> <frame> | bpm <bpm> | nudge <deck> <frames>
           bend <deck> <speed> | jump <deck> beats|bars <n> | beatmatch <src> <dst>
           loop <deck> <start> <end> | looping <deck> on|off
lanes:     lane <deck> <lane> gain|db|pan|mute|solo|hp|lp|reverb|delay <value>
mixer:     xfade <0-1> | blend <0-1> | master <0-2> | cliponly <deck> on|off
           scenea <n> | sceneb <n> | morph <0-1> | store <n>
clips:     clip <deck> <lane> <slot>|stop | scene <deck> <n> | select <deck> a|b <n> [launch]
           pattern <deck> <lane> <tokens..> | clear <deck> | page <deck> <page>
synth:     synth on|off | synth gain <g> | synth lane <l> gain|pan|mute <v>
           synth pattern <l> <notes..> | synth patch <l> osc|amp|attack|decay|sustain|release|cutoff <v>
other:     load <deck> <path> | status | help | quit";

fn deck(token: Option<&str>) -> Result<DeckId> {
    match token.map(str::to_ascii_lowercase).as_deref() {
        Some("a") => Ok(DeckId::A),
        Some("b") => Ok(DeckId::B),
        Some(other) => bail!("unknown deck {:?} (expected a or b)", other),
        None => bail!("missing deck"),
    }
}

fn number<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T> {
    let token = token.ok_or_else(|| anyhow!("missing {}", what))?;
    token.parse().map_err(|_| anyhow!("invalid {}: {:?}", what, token))
}

/// 1-based index to zero-based
fn index(token: Option<&str>, what: &str) -> Result<usize> {
    let n: usize = number(token, what)?;
    n.checked_sub(1).ok_or_else(|| anyhow!("{} numbers start at 1", what))
}

fn switch(token: Option<&str>) -> Result<bool> {
    match token {
        Some("on") | Some("1") | Some("true") => Ok(true),
        Some("off") | Some("0") | Some("false") => Ok(false),
        _ => bail!("expected on or off"),
    }
}

/// Everything after the first `skip` words, kept verbatim
fn rest_after(line: &str, skip: usize) -> String {
    line.split_whitespace().skip(skip).collect::<Vec<_>>().join(" ")
}

fn unquote(path: &str) -> &str {
    if path.len() >= 2
        && ((path.starts_with('\'') && path.ends_with('\'')) || (path.starts_with('"') && path.ends_with('"')))
    {
        &path[1..path.len() - 1]
    } else {
        path
    }
}

pub fn parse_line(line: &str) -> Result<Input> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let mut arg = || words.next();

    let cmd = match verb {
        "q" | "quit" | "exit" => return Ok(Input::Quit),
        "help" | "?" => return Ok(Input::Help),
        "status" => return Ok(Input::Status),
        "load" => {
            let token = arg().context("missing deck")?;
            let d = deck(Some(token))?;
            // Paths may contain spaces, so take the raw remainder of the line
            let path = line[verb.len()..]
                .trim_start()
                .strip_prefix(token)
                .map(|p| unquote(p.trim()))
                .filter(|p| !p.is_empty())
                .context("missing path")?;
            return Ok(Input::Load(d, PathBuf::from(path)));
        }

        "play" => AudioCommand::Play(deck(arg())?),
        "stop" => AudioCommand::Stop(deck(arg())?),
        "seek" => AudioCommand::Seek {
            deck: deck(arg())?,
            position: number(arg(), "frame")?,
        },
        "bpm" => AudioCommand::SetBpm(number(arg(), "bpm")?),
        "nudge" => AudioCommand::Nudge {
            deck: deck(arg())?,
            samples: number(arg(), "frames")?,
        },
        "bend" => AudioCommand::Bend {
            deck: deck(arg())?,
            speed: number(arg(), "speed")?,
        },
        "jump" => {
            let d = deck(arg())?;
            let unit = match arg() {
                Some("beats") | Some("beat") => JumpUnit::Beats,
                Some("bars") | Some("bar") => JumpUnit::Bars,
                _ => bail!("expected beats or bars"),
            };
            AudioCommand::Jump {
                deck: d,
                unit,
                amount: number(arg(), "amount")?,
            }
        }
        "beatmatch" | "sync" => AudioCommand::Beatmatch {
            source: deck(arg())?,
            target: deck(arg())?,
        },
        "loop" => AudioCommand::SetLoop {
            deck: deck(arg())?,
            start: number(arg(), "loop start")?,
            end: number(arg(), "loop end")?,
        },
        "looping" => AudioCommand::SetLooping {
            deck: deck(arg())?,
            looping: switch(arg())?,
        },

        "lane" => {
            let d = deck(arg())?;
            let lane = index(arg(), "lane")?;
            let param = match arg() {
                Some("gain") => LaneParam::Gain(number(arg(), "gain")?),
                Some("db") => LaneParam::GainDb(number(arg(), "gain")?),
                Some("pan") => LaneParam::Pan(number(arg(), "pan")?),
                Some("mute") => LaneParam::Mute(switch(arg())?),
                Some("solo") => LaneParam::Solo(switch(arg())?),
                Some("hp") => LaneParam::HighPass(number(arg(), "cutoff")?),
                Some("lp") => LaneParam::LowPass(number(arg(), "cutoff")?),
                Some("reverb") => LaneParam::SendReverb(number(arg(), "send")?),
                Some("delay") => LaneParam::SendDelay(number(arg(), "send")?),
                other => bail!("unknown lane parameter {:?}", other.unwrap_or("")),
            };
            AudioCommand::SetLane { deck: d, lane, param }
        }
        "xfade" => AudioCommand::SetMixer(MixerParam::Crossfade(number(arg(), "crossfade")?)),
        "blend" => AudioCommand::SetMixer(MixerParam::StemBlend(number(arg(), "blend")?)),
        "master" => AudioCommand::SetMixer(MixerParam::MasterGain(number(arg(), "gain")?)),
        "cliponly" => {
            let d = deck(arg())?;
            AudioCommand::SetMixer(MixerParam::ClipOnly(d, switch(arg())?))
        }
        "scenea" => AudioCommand::SetMixer(MixerParam::SceneA(index(arg(), "scene")?)),
        "sceneb" => AudioCommand::SetMixer(MixerParam::SceneB(index(arg(), "scene")?)),
        "morph" => AudioCommand::SetMixer(MixerParam::SceneMorph(number(arg(), "morph")?)),
        "store" => AudioCommand::StoreScene(index(arg(), "scene")?),

        "clip" => {
            let d = deck(arg())?;
            let lane = index(arg(), "lane")?;
            let slot = match arg() {
                Some("stop") => None,
                token => Some(index(token, "slot")?),
            };
            AudioCommand::QueueClip { deck: d, lane, slot }
        }
        "scene" => AudioCommand::TriggerScene {
            deck: deck(arg())?,
            scene: index(arg(), "scene")?,
        },
        "select" => {
            let d = deck(arg())?;
            let bank = match arg() {
                Some("a") => SceneBank::A,
                Some("b") => SceneBank::B,
                _ => bail!("expected scene bank a or b"),
            };
            let scene = index(arg(), "scene")?;
            AudioCommand::SelectScene {
                deck: d,
                bank,
                scene,
                launch: arg() == Some("launch"),
            }
        }
        "pattern" => {
            let d = deck(arg())?;
            let lane = index(arg(), "lane")?;
            AudioCommand::SetPattern {
                deck: d,
                lane,
                pattern: rest_after(line, 3),
            }
        }
        "clear" => AudioCommand::ClearPatterns(deck(arg())?),
        "page" => AudioCommand::SetPage {
            deck: deck(arg())?,
            page: number(arg(), "page")?,
        },

        "synth" => AudioCommand::Synth(parse_synth(line, &mut line.split_whitespace().skip(1))?),

        other => bail!("unknown command {:?} (try help)", other),
    };
    Ok(Input::Engine(cmd))
}

fn parse_synth<'a>(line: &str, words: &mut impl Iterator<Item = &'a str>) -> Result<SynthCommand> {
    let cmd = match words.next() {
        Some("on") => SynthCommand::Enable(true),
        Some("off") => SynthCommand::Enable(false),
        Some("gain") => SynthCommand::Gain(number(words.next(), "gain")?),
        Some("lane") => {
            let lane = index(words.next(), "synth lane")?;
            match words.next() {
                Some("gain") => SynthCommand::LaneGain {
                    lane,
                    gain: number(words.next(), "gain")?,
                },
                Some("pan") => SynthCommand::LanePan {
                    lane,
                    pan: number(words.next(), "pan")?,
                },
                Some("mute") => SynthCommand::LaneMute {
                    lane,
                    muted: switch(words.next())?,
                },
                other => bail!("unknown synth lane parameter {:?}", other.unwrap_or("")),
            }
        }
        Some("pattern") => SynthCommand::Pattern {
            lane: index(words.next(), "synth lane")?,
            pattern: rest_after(line, 3),
        },
        Some("patch") => {
            let lane = index(words.next(), "synth lane")?;
            let param = match words.next() {
                Some("osc") => {
                    let name = words.next().unwrap_or("");
                    PatchParam::Oscillator(
                        Oscillator::from_name(name).ok_or_else(|| anyhow!("unknown oscillator {:?}", name))?,
                    )
                }
                Some("amp") => PatchParam::Amplitude(number(words.next(), "amplitude")?),
                Some("attack") => PatchParam::Attack(number(words.next(), "attack")?),
                Some("decay") => PatchParam::Decay(number(words.next(), "decay")?),
                Some("sustain") => PatchParam::Sustain(number(words.next(), "sustain")?),
                Some("release") => PatchParam::Release(number(words.next(), "release")?),
                Some("cutoff") => PatchParam::Cutoff(number(words.next(), "cutoff")?),
                other => bail!("unknown patch parameter {:?}", other.unwrap_or("")),
            };
            SynthCommand::Patch { lane, param }
        }
        other => bail!("unknown synth command {:?}", other.unwrap_or("")),
    };
    Ok(cmd)
}
