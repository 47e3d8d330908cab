#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    #[error("Audio source is empty")]
    EmptySource,

    #[error("Could not play {source_url}: {message}")]
    Playback { source_url: String, message: String },
}

pub trait AudioPlayer {
    fn play(&self, source: &str) -> Result<(), AudioError>;
}

/// Plays nothing. The default until the host installs a real player.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl AudioPlayer for Silent {
    fn play(&self, source: &str) -> Result<(), AudioError> {
        log::debug!("Not playing {source}: no audio player installed");
        Ok(())
    }
}

/// Play a clip if there is one. Audio is never worth failing a drill over, so
/// every problem is logged and reported as `false`.
pub fn play_clip(player: &dyn AudioPlayer, source: Option<&str>) -> bool {
    let Some(source) = source else {
        return false;
    };
    if source.trim().is_empty() {
        log::warn!("{}", AudioError::EmptySource);
        return false;
    }
    match player.play(source) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{e}");
            false
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::HtmlAudioPlayer;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::{AudioError, AudioPlayer};

    /// `new Audio(src).play()`. Rejections of the returned promise (autoplay
    /// policy, missing file) only show up later, so they are logged there.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct HtmlAudioPlayer;

    impl AudioPlayer for HtmlAudioPlayer {
        fn play(&self, source: &str) -> Result<(), AudioError> {
            let playback = |message: String| AudioError::Playback {
                source_url: source.to_string(),
                message,
            };
            let element = web_sys::HtmlAudioElement::new_with_src(source)
                .map_err(|e| playback(format!("{e:?}")))?;
            let promise = element.play().map_err(|e| playback(format!("{e:?}")))?;

            let source = source.to_string();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                    log::warn!("Playback of {source} failed: {e:?}");
                }
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recording {
        played: RefCell<Vec<String>>,
        broken: bool,
    }

    impl AudioPlayer for Recording {
        fn play(&self, source: &str) -> Result<(), AudioError> {
            if self.broken {
                return Err(AudioError::Playback {
                    source_url: source.to_string(),
                    message: "NotAllowedError".to_string(),
                });
            }
            self.played.borrow_mut().push(source.to_string());
            Ok(())
        }
    }

    #[test]
    fn plays_when_there_is_a_source() {
        let player = Recording::default();
        assert!(play_clip(&player, Some("/audio/sw/maji.mp3")));
        assert!(!play_clip(&player, None));
        assert!(!play_clip(&player, Some("  ")));
        assert_eq!(*player.played.borrow(), vec!["/audio/sw/maji.mp3"]);
    }

    #[test]
    fn playback_errors_are_swallowed() {
        let player = Recording {
            broken: true,
            ..Default::default()
        };
        assert!(!play_clip(&player, Some("/audio/sw/maji.mp3")));
    }
}
