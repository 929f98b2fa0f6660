use crate::net::MAX_LISTED_PLAYERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobbyState {
    Waiting,
    InGame,
}

#[derive(Debug, Clone)]
pub struct LobbySettings {
    pub max_players: usize,
    pub min_players: usize,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            max_players: MAX_LISTED_PLAYERS,
            min_players: 1,
        }
    }
}

#[derive(Debug)]
pub struct Lobby {
    pub settings: LobbySettings,
    state: LobbyState,
    started_at_ms: Option<u64>,
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(LobbySettings::default())
    }
}

impl Lobby {
    pub fn new(mut settings: LobbySettings) -> Self {
        // the client list cannot describe more players than this
        settings.max_players = settings.max_players.clamp(1, MAX_LISTED_PLAYERS);
        settings.min_players = settings.min_players.clamp(1, settings.max_players);
        Self {
            settings,
            state: LobbyState::Waiting,
            started_at_ms: None,
        }
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    pub fn in_game(&self) -> bool {
        self.state == LobbyState::InGame
    }

    pub fn is_full(&self, player_count: usize) -> bool {
        player_count >= self.settings.max_players
    }

    pub fn should_start(&self, ready_count: usize, player_count: usize) -> bool {
        self.state == LobbyState::Waiting
            && player_count >= self.settings.min_players
            && ready_count == player_count
    }

    pub fn start(&mut self, now_ms: u64) -> bool {
        if self.state != LobbyState::Waiting {
            return false;
        }
        self.state = LobbyState::InGame;
        self.started_at_ms = Some(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.state = LobbyState::Waiting;
        self.started_at_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_starts_when_everyone_is_ready() {
        let mut lobby = Lobby::new(LobbySettings {
            max_players: 4,
            min_players: 2,
        });

        assert!(!lobby.should_start(1, 1));
        assert!(!lobby.should_start(1, 2));
        assert!(lobby.should_start(2, 2));

        assert!(lobby.start(1000));
        assert!(lobby.in_game());
        assert!(!lobby.start(2000));
        assert_eq!(lobby.started_at_ms(), Some(1000));
        assert!(!lobby.should_start(2, 2));

        lobby.reset();
        assert_eq!(lobby.state(), LobbyState::Waiting);
    }

    #[test]
    fn test_settings_are_clamped_to_list_capacity() {
        let lobby = Lobby::new(LobbySettings {
            max_players: 100,
            min_players: 0,
        });
        assert_eq!(lobby.settings.max_players, MAX_LISTED_PLAYERS);
        assert_eq!(lobby.settings.min_players, 1);
        assert!(lobby.is_full(MAX_LISTED_PLAYERS));
        assert!(!lobby.is_full(MAX_LISTED_PLAYERS - 1));
    }
}
