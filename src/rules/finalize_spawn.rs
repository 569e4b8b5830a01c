use anyhow::Result;

use crate::ir::CallKind;
use crate::rules::{Redirect, RedirectionRule};
use crate::targets::parse_targets;

const TARGETS: &str = include_str!("../../resources/finalize_spawn_targets.json");

const METHOD: &str = "finalizeSpawn";
const DESCRIPTOR: &str = "(Lnet/minecraft/world/level/ServerLevelAccessor;Lnet/minecraft/world/DifficultyInstance;Lnet/minecraft/world/entity/EntitySpawnReason;Lnet/minecraft/world/entity/SpawnGroupData;)Lnet/minecraft/world/entity/SpawnGroupData;";

const HOOK_OWNER: &str = "net/minecraftforge/event/ForgeEventFactory";
const HOOK_NAME: &str = "onFinalizeSpawn";
const HOOK_DESCRIPTOR: &str = "(Lnet/minecraft/world/entity/Mob;Lnet/minecraft/world/level/ServerLevelAccessor;Lnet/minecraft/world/DifficultyInstance;Lnet/minecraft/world/entity/EntitySpawnReason;Lnet/minecraft/world/entity/SpawnGroupData;)Lnet/minecraft/world/entity/SpawnGroupData;";

/// Routes `Mob.finalizeSpawn` calls through the spawn event hook.
pub(crate) fn rule() -> Result<RedirectionRule> {
    Ok(RedirectionRule {
        name: METHOD.to_string(),
        kind: CallKind::Virtual,
        method: METHOD.to_string(),
        descriptor: DESCRIPTOR.to_string(),
        targets: parse_targets(TARGETS, "finalize_spawn_targets.json")?,
        redirect: Redirect::InvokeStatic {
            owner: HOOK_OWNER.to_string(),
            name: HOOK_NAME.to_string(),
            descriptor: Some(HOOK_DESCRIPTOR.to_string()),
        },
    })
}
