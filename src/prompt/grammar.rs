//! Role descriptions, directive references and examples shown to each agent kind.

use crate::agents::AgentKind;
use crate::directive::Dialect;

const CODER_GRAMMAR: &str = r#"Directives:
  READ FILE "name" [FILE "other" ...]     add files to your memory (paths relative to your directory)
  RUN COMMAND="command"                   run an allowed shell command in your directory
  CHANGE CONTENT="full new file content"  overwrite your own file
  SPAWN TESTER PROMPT="what to test"      start a tester (repeat TESTER PROMPT=... for more)
  WAIT                                    wait for your testers to report
  FINISH PROMPT="summary"                 report your work and end the task

Strings are double-quoted and may span lines; write \" for a quote and \\ for a backslash."#;

const TESTER_GRAMMAR: &str = r#"Directives:
  READ FILE "name" [FILE "other" ...]     add files to your memory (paths relative to your directory)
  RUN COMMAND="command"                   run an allowed shell command in your directory
  CHANGE CONTENT="full new file content"  overwrite your scratch file
  WAIT                                    wait (only useful while something is running)
  FINISH PROMPT="report"                  report the test results and end

Strings are double-quoted and may span lines; write \" for a quote and \\ for a backslash."#;

const MANAGER_GRAMMAR: &str = r#"Directives:
  READ FILE "name" | FOLDER "name" ...           add files (or a folder's notes) to your memory
  CREATE FILE "name" [CONTENT="..."]             create a file directly inside your directory
  CREATE FOLDER "name"                           create a sub-directory directly inside your directory
  DELETE FILE "name" | FOLDER "name"             delete an entry of your directory
  DELEGATE FILE "name" PROMPT="task" ...         give tasks to children (FOLDER for sub-directories)
  RUN COMMAND="command"                          run an allowed shell command in your directory
  UPDATE_README CONTENT="notes"                  overwrite the notes of your directory
  SPAWN TESTER PROMPT="what to test"             start a tester in a scratch file
  WAIT                                           wait for children and testers to report
  FINISH PROMPT="summary"                        report your work and end the task (children must be done)

Strings are double-quoted and may span lines; write \" for a quote and \\ for a backslash."#;

const MASTER_GRAMMAR: &str = r#"Directives:
  READ FILE "name" | FOLDER "name" ...   add files (or a folder's notes) to your memory
  DELEGATE PROMPT="task"                 hand a task to the root agent of the codebase
  SPAWN TESTER PROMPT="what to test"     start a tester in a scratch file
  RUN COMMAND="command"                  run an allowed shell command at the project root
  WAIT                                   wait for the root agent and testers to report
  UPDATE_DOCUMENTATION CONTENT="text"    overwrite the project documentation
  MESSAGE PROMPT="question"              ask the human something and keep working
  FINISH PROMPT="summary"                hand back to the human once everything reported

Strings are double-quoted and may span lines; write \" for a quote and \\ for a backslash."#;

const CODER_EXAMPLES: &str = r#"READ FILE "helpers.py"
CHANGE CONTENT="def add(a, b):
    return a + b
"
SPAWN TESTER PROMPT="Check add() with negative numbers"
FINISH PROMPT="Implemented add()""#;

const TESTER_EXAMPLES: &str = r#"CHANGE CONTENT="from calc import add

def test_add():
    assert add(-1, 1) == 0
"
RUN COMMAND="pytest -q calc_scratch.py"
FINISH PROMPT="1 passed""#;

const MANAGER_EXAMPLES: &str = r#"READ FOLDER "utils"
CREATE FILE "cli.py"
DELEGATE FILE "cli.py" PROMPT="Add an argument parser" FOLDER "utils" PROMPT="Expose parse_args"
WAIT
UPDATE_README CONTENT="cli.py: entry point. utils/: helpers."
FINISH PROMPT="CLI added""#;

const MASTER_EXAMPLES: &str = r#"READ FILE "README.md"
DELEGATE PROMPT="Add input validation to every public function"
WAIT
RUN COMMAND="pytest -q"
FINISH PROMPT="Validation added, 12 tests pass""#;

/// One-paragraph role description for `kind`.
pub fn role(kind: AgentKind, name: &str) -> String {
    match kind {
        AgentKind::Master => "the master agent of a software project. You take requests from a \
             human, hand them to the root agent of the codebase, check the outcome and report \
             back to the human."
            .to_string(),
        AgentKind::Manager => format!(
            "the agent responsible for the directory `{}`. You plan work for your directory, \
             delegate file-level work to your children and keep the directory notes current.",
            name
        ),
        AgentKind::Coder => format!(
            "the agent responsible for the file `{}`. You read, change and test this one file.",
            name
        ),
        AgentKind::Ephemeral(_) => format!(
            "a tester working in the scratch file `{}`. You write tests there, run them and \
             report the results.",
            name
        ),
    }
}

pub fn grammar(kind: AgentKind) -> &'static str {
    match (kind.dialect(), kind.is_ephemeral()) {
        (Dialect::Coder, true) => TESTER_GRAMMAR,
        (Dialect::Coder, false) => CODER_GRAMMAR,
        (Dialect::Manager, _) => MANAGER_GRAMMAR,
        (Dialect::Master, _) => MASTER_GRAMMAR,
    }
}

pub fn examples(kind: AgentKind) -> &'static str {
    match (kind.dialect(), kind.is_ephemeral()) {
        (Dialect::Coder, true) => TESTER_EXAMPLES,
        (Dialect::Coder, false) => CODER_EXAMPLES,
        (Dialect::Manager, _) => MANAGER_EXAMPLES,
        (Dialect::Master, _) => MASTER_EXAMPLES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, EphemeralKind};

    #[test]
    fn every_example_parses_in_its_dialect() {
        let kinds = [
            AgentKind::Master,
            AgentKind::Manager,
            AgentKind::Coder,
            AgentKind::Ephemeral(EphemeralKind::Tester),
        ];
        for kind in kinds {
            let text = examples(kind);
            let mut directives = Vec::new();
            let mut current = String::new();
            for line in text.lines() {
                let starts_directive = kind
                    .dialect()
                    .verbs()
                    .iter()
                    .any(|verb| line.starts_with(verb));
                if starts_directive && !current.is_empty() {
                    directives.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
            directives.push(current);

            for directive in directives {
                assert!(
                    Directive::parse(kind.dialect(), &directive).is_ok(),
                    "{:?}: {}",
                    kind,
                    directive
                );
            }
        }
    }

    #[test]
    fn grammar_lists_every_verb() {
        for kind in [AgentKind::Master, AgentKind::Manager, AgentKind::Coder] {
            for verb in kind.dialect().verbs() {
                assert!(grammar(kind).contains(verb), "{:?} misses {}", kind, verb);
            }
        }
    }
}
