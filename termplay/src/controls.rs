use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::settings::SeekSteps;

/**
    A request from the keyboard to the player.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Seek by this many seconds, negative for backwards.
    Seek(f64),
    TogglePause,
    Quit,
}

/**
    Translate a key press into a player command.

    Arrow keys seek by the normal step, with Shift for the small step and
    Ctrl for the large one. Key releases and repeats of non-seek keys are
    ignored.
*/
pub fn map_key(key: &KeyEvent, steps: &SeekSteps) -> Option<Command> {
    if key.kind == KeyEventKind::Release {
        return None;
    }

    let step = if key.modifiers.contains(KeyModifiers::CONTROL) {
        steps.large
    } else if key.modifiers.contains(KeyModifiers::SHIFT) {
        steps.small
    } else {
        steps.normal
    };

    match key.code {
        KeyCode::Left => Some(Command::Seek(-step)),
        KeyCode::Right => Some(Command::Seek(step)),
        _ if key.kind == KeyEventKind::Repeat => None,
        KeyCode::Char(' ') => Some(Command::TogglePause),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn arrows_seek_by_step() {
        let steps = SeekSteps::default();
        assert_eq!(
            map_key(&press(KeyCode::Right, KeyModifiers::NONE), &steps),
            Some(Command::Seek(10.0))
        );
        assert_eq!(
            map_key(&press(KeyCode::Left, KeyModifiers::SHIFT), &steps),
            Some(Command::Seek(-4.0))
        );
        assert_eq!(
            map_key(&press(KeyCode::Right, KeyModifiers::CONTROL), &steps),
            Some(Command::Seek(30.0))
        );
    }

    #[test]
    fn custom_steps_are_used() {
        let steps = SeekSteps {
            small: 1.0,
            normal: 5.0,
            large: 60.0,
        };
        assert_eq!(
            map_key(&press(KeyCode::Left, KeyModifiers::CONTROL), &steps),
            Some(Command::Seek(-60.0))
        );
    }

    #[test]
    fn space_and_quit_keys() {
        let steps = SeekSteps::default();
        assert_eq!(
            map_key(&press(KeyCode::Char(' '), KeyModifiers::NONE), &steps),
            Some(Command::TogglePause)
        );
        assert_eq!(
            map_key(&press(KeyCode::Char('q'), KeyModifiers::NONE), &steps),
            Some(Command::Quit)
        );
        assert_eq!(map_key(&press(KeyCode::Esc, KeyModifiers::NONE), &steps), Some(Command::Quit));
        assert_eq!(
            map_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL), &steps),
            Some(Command::Quit)
        );
        assert_eq!(map_key(&press(KeyCode::Char('x'), KeyModifiers::NONE), &steps), None);
    }

    #[test]
    fn releases_are_ignored() {
        let steps = SeekSteps::default();
        let mut key = press(KeyCode::Right, KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(map_key(&key, &steps), None);
    }

    #[test]
    fn held_arrow_keeps_seeking_but_held_space_does_not() {
        let steps = SeekSteps::default();
        let mut arrow = press(KeyCode::Left, KeyModifiers::NONE);
        arrow.kind = KeyEventKind::Repeat;
        assert_eq!(map_key(&arrow, &steps), Some(Command::Seek(-10.0)));

        let mut space = press(KeyCode::Char(' '), KeyModifiers::NONE);
        space.kind = KeyEventKind::Repeat;
        assert_eq!(map_key(&space, &steps), None);
    }
}
