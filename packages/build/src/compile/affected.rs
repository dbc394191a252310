// Affected Files
//
// Drains the builder's next-affected-file protocol. Type-check shims never
// show up themselves; their origin file is reported instead.

use crate::ngtsc::shims::{is_shim, origin_of_shim};
use std::collections::BTreeSet;
use tracing::debug;
use ts::BuilderProgram;

/// Files of `program` that need new diagnostics or emit this pass.
pub fn collect_affected_files(program: &mut BuilderProgram) -> BTreeSet<String> {
    let mut affected = BTreeSet::new();
    let mut correlated = 0usize;

    while let Some(result) = program.get_semantic_diagnostics_of_next_affected_file(is_shim) {
        if !is_shim(&result.file_name) {
            affected.insert(result.file_name);
            continue;
        }
        if let Some(origin) = origin_in_program(program, &result.file_name) {
            correlated += 1;
            affected.insert(origin);
        }
    }

    // Without an in-memory history the drained queue can come from a
    // persisted snapshot; re-derive every shim correlation.
    if !program.has_affected_history() {
        let shims: Vec<String> = program
            .source_files()
            .map(|file| file.file_name.clone())
            .filter(|file_name| is_shim(file_name))
            .collect();
        for shim in shims {
            if let Some(origin) = origin_in_program(program, &shim) {
                affected.insert(origin);
            }
        }
    }

    debug!(
        affected = affected.len(),
        correlated,
        history = program.has_affected_history(),
        "collected affected files"
    );
    affected
}

fn origin_in_program(program: &BuilderProgram, shim: &str) -> Option<String> {
    origin_of_shim(shim).filter(|origin| program.get_source_file(origin).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use ts::{CompilerHost, CompilerOptions, ProgramBaseline};

    struct MemoryHost(HashMap<String, String>);

    impl MemoryHost {
        fn new(files: &[(&str, &str)]) -> Self {
            MemoryHost(
                files
                    .iter()
                    .map(|(name, text)| (name.to_string(), text.to_string()))
                    .collect(),
            )
        }
    }

    impl CompilerHost for MemoryHost {
        fn file_exists(&self, file_name: &str) -> bool {
            self.0.contains_key(file_name)
        }

        fn read_file(&self, file_name: &str) -> Option<String> {
            self.0.get(file_name).cloned()
        }

        fn get_current_directory(&self) -> String {
            "/".to_string()
        }
    }

    const COMP: &str = "export class Comp { title = 'a'; }\n";
    const MAIN: &str = "import { Comp } from './comp';\nnew Comp();\n";

    fn roots() -> Vec<String> {
        vec![
            "/src/main.ts".to_string(),
            "/src/comp.ngtypecheck.ts".to_string(),
        ]
    }

    fn shim(hash: &str) -> String {
        format!(
            "import * as i0 from \"./comp\";\n\n/*T:{}*/\nfunction _tcb_Comp(ctx: i0.Comp) {{\n  ctx.title;\n}}\n",
            hash
        )
    }

    fn create(host: &MemoryHost, baseline: Option<ProgramBaseline>) -> BuilderProgram {
        BuilderProgram::create(&roots(), CompilerOptions::default(), host, baseline)
    }

    #[test]
    fn cold_start_reports_user_files_only() {
        let comp_shim = shim("1");
        let host = MemoryHost::new(&[
            ("/src/main.ts", MAIN),
            ("/src/comp.ts", COMP),
            ("/src/comp.ngtypecheck.ts", comp_shim.as_str()),
        ]);
        let mut program = create(&host, None);
        let affected = collect_affected_files(&mut program);
        assert_eq!(
            affected.into_iter().collect::<Vec<_>>(),
            vec!["/src/comp.ts", "/src/main.ts"]
        );
    }

    #[test]
    fn changed_shim_affects_its_origin() {
        let files = [("/src/main.ts", MAIN), ("/src/comp.ts", COMP)];
        let first_shim = shim("1");
        let mut first_files = files.to_vec();
        first_files.push(("/src/comp.ngtypecheck.ts", first_shim.as_str()));
        let mut first = create(&MemoryHost::new(&first_files), None);
        collect_affected_files(&mut first);

        let second_shim = shim("2");
        let mut second_files = files.to_vec();
        second_files.push(("/src/comp.ngtypecheck.ts", second_shim.as_str()));
        let mut second = create(
            &MemoryHost::new(&second_files),
            Some(ProgramBaseline::Program(Box::new(first))),
        );
        let affected = collect_affected_files(&mut second);
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["/src/comp.ts"]);
    }

    #[test]
    fn unchanged_program_has_nothing_affected() {
        let comp_shim = shim("1");
        let host = MemoryHost::new(&[
            ("/src/main.ts", MAIN),
            ("/src/comp.ts", COMP),
            ("/src/comp.ngtypecheck.ts", comp_shim.as_str()),
        ]);
        let mut first = create(&host, None);
        collect_affected_files(&mut first);
        let mut second = create(&host, Some(ProgramBaseline::Program(Box::new(first))));
        assert!(collect_affected_files(&mut second).is_empty());
    }

    #[test]
    fn snapshot_baseline_rederives_shim_origins() {
        let comp_shim = shim("1");
        let host = MemoryHost::new(&[
            ("/src/main.ts", MAIN),
            ("/src/comp.ts", COMP),
            ("/src/comp.ngtypecheck.ts", comp_shim.as_str()),
        ]);
        let mut first = create(&host, None);
        collect_affected_files(&mut first);
        let info = first.to_build_info();

        let mut resumed = create(&host, Some(ProgramBaseline::BuildInfo(info)));
        assert!(!resumed.has_affected_history());
        let affected = collect_affected_files(&mut resumed);
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec!["/src/comp.ts"]);
    }
}
