/*!
# VPS Watch DevKit - Doubles de test pour l'agent

Bibliothèque facilitant les tests de `vpswatch-agent` sans VPS ni Discord:
- Faux canal Discord qui enregistre envois, éditions et suppressions
- Faux shell SSH avec réponses scriptées et comptage des sessions
- Sonde ping et lookup d'IP publique contrôlables
- Harness qui assemble un `MonitorService` complet
*/

pub mod chat_stub;
pub mod shell_stub;
pub mod test_utils;

pub use chat_stub::{ChatRecord, FailureKind, MockChatChannel};
pub use shell_stub::{MockRemoteShell, OutputBuilder, StaticIpLookup, StaticProber};
pub use test_utils::TestHarness;
