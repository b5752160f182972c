//! End-to-end tests driving the full lex/parse/expand/execute pipeline
//! through a shell session.

use oxsh::shell::{Shell, ShellOptionsInit};

async fn run(script: &str) -> (String, String, i32) {
    let mut shell = Shell::new(ShellOptionsInit::default());
    let result = shell.exec(script).await;
    (result.stdout, result.stderr, result.exit_code)
}

async fn stdout_of(script: &str) -> String {
    run(script).await.0
}

// =============================================================================
// SPEC SCENARIOS
// =============================================================================

#[tokio::test]
async fn pipeline_and_pipestatus() {
    let (stdout, _, status) = run("true | false | true; echo $?:${PIPESTATUS}").await;
    assert_eq!(stdout, "0:0 1 0\n");
    assert_eq!(status, 0);
}

#[tokio::test]
async fn errexit_suppressed_by_condition() {
    let (stdout, _, status) = run("set -e; if false; then echo no; fi; echo ok").await;
    assert_eq!(stdout, "ok\n");
    assert_eq!(status, 0);
}

#[tokio::test]
async fn parameter_default_with_tilde() {
    let (stdout, _, _) = run("HOME=/h; x=${y:-~}; echo $x").await;
    assert_eq!(stdout, "/h\n");
}

#[tokio::test]
async fn field_splitting_custom_ifs() {
    let (stdout, _, _) = run("IFS=:; v=a::b; set -- $v; echo $#=$1|$2|$3").await;
    assert_eq!(stdout, "3=a||b\n");
}

#[tokio::test]
async fn brace_expansion_glob_preserves_on_no_match() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!("cd {}; echo {{a,b}}.x", dir.path().display());
    let (stdout, _, _) = run(&script).await;
    assert_eq!(stdout, "a.x b.x\n");
}

#[tokio::test]
async fn arithmetic_assignment_through_substitution() {
    let (stdout, _, _) = run("x=10; y=$((x += 5, x * 2)); echo $x $y").await;
    assert_eq!(stdout, "15 30\n");
}

// =============================================================================
// EXPANSION INVARIANTS
// =============================================================================

#[tokio::test]
async fn quotes_preserve_bytes() {
    assert_eq!(stdout_of("echo \"a  b   c\"").await, "a  b   c\n");
    assert_eq!(stdout_of("echo 'x*y?z'").await, "x*y?z\n");
}

#[tokio::test]
async fn splitting_only_from_unquoted_expansion() {
    assert_eq!(stdout_of("v='a b'; set -- $v; echo $#").await, "2\n");
    assert_eq!(stdout_of("v='a b'; set -- \"$v\"; echo $#").await, "1\n");
    // Literal text never splits
    assert_eq!(stdout_of("set -- a\\ b; echo $#").await, "1\n");
}

#[tokio::test]
async fn quoted_star_does_not_glob() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f1.txt"), "").unwrap();
    std::fs::write(dir.path().join("f2.txt"), "").unwrap();
    let base = format!("cd {};", dir.path().display());

    let globbed = stdout_of(&format!("{} echo *.txt", base)).await;
    assert_eq!(globbed, "f1.txt f2.txt\n");

    let quoted = stdout_of(&format!("{} echo '*.txt'", base)).await;
    assert_eq!(quoted, "*.txt\n");

    // An unquoted variable expansion globs
    let via_var = stdout_of(&format!("{} pat='*.txt'; echo $pat", base)).await;
    assert_eq!(via_var, "f1.txt f2.txt\n");

    // A quoted variable expansion does not
    let via_quoted = stdout_of(&format!("{} pat='*.txt'; echo \"$pat\"", base)).await;
    assert_eq!(via_quoted, "*.txt\n");
}

#[tokio::test]
async fn noglob_disables_pathname_expansion() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("g.txt"), "").unwrap();
    let script = format!("cd {}; set -f; echo *.txt", dir.path().display());
    assert_eq!(stdout_of(&script).await, "*.txt\n");
}

#[tokio::test]
async fn quoted_at_expands_per_parameter() {
    assert_eq!(
        stdout_of("set -- 'a b' c; for x in \"$@\"; do echo [$x]; done").await,
        "[a b]\n[c]\n"
    );
    // Affixes attach to first and last fields
    assert_eq!(
        stdout_of("set -- 1 2 3; set -- \"pre$@post\"; echo $#:$1:$3").await,
        "3:pre1:3post\n"
    );
}

#[tokio::test]
async fn quoted_star_joins_on_first_ifs_char() {
    assert_eq!(
        stdout_of("set -- a b c; IFS=:; echo \"$*\"").await,
        "a:b:c\n"
    );
    assert_eq!(stdout_of("set -- a b c; echo \"$*\"").await, "a b c\n");
}

#[tokio::test]
async fn echo_at_round_trip() {
    assert_eq!(stdout_of("set -- a b c; echo \"$@\"").await, "a b c\n");
}

#[tokio::test]
async fn tilde_forms() {
    assert_eq!(stdout_of("HOME=/home/u; echo ~").await, "/home/u\n");
    assert_eq!(stdout_of("HOME=/home/u; echo ~/sub").await, "/home/u/sub\n");
    assert_eq!(
        stdout_of("PWD=/somewhere; echo ~+").await,
        "/somewhere\n"
    );
    // Mid-word tilde is literal
    assert_eq!(stdout_of("echo a~b").await, "a~b\n");
}

#[tokio::test]
async fn ifs_unset_restores_default() {
    assert_eq!(
        stdout_of("IFS=:; unset IFS; v='a b'; set -- $v; echo $#").await,
        "2\n"
    );
}

// =============================================================================
// PARAMETER OPERATIONS
// =============================================================================

#[tokio::test]
async fn default_assign_alternative_error() {
    assert_eq!(stdout_of("echo ${unset_x:-fallback}").await, "fallback\n");
    assert_eq!(stdout_of("x=''; echo ${x:-empty} ${x-set}").await, "empty\n");
    assert_eq!(stdout_of("echo ${y:=assigned}; echo $y").await, "assigned\nassigned\n");
    assert_eq!(stdout_of("x=v; echo ${x:+alt}").await, "alt\n");
    assert_eq!(stdout_of("echo _${unset_z:+alt}_").await, "__\n");
}

#[tokio::test]
async fn error_if_unset_aborts_with_2() {
    let (_, stderr, status) = run("echo ${nope:?custom message}; echo after").await;
    assert_eq!(status, 2);
    assert!(stderr.contains("custom message"));
}

#[tokio::test]
async fn nounset_errors() {
    let (_, stderr, status) = run("set -u; echo $missing_var; echo after").await;
    assert_eq!(status, 1);
    assert!(stderr.contains("unbound variable"));
}

#[tokio::test]
async fn length_strip_and_substitute() {
    assert_eq!(stdout_of("x=hello; echo ${#x}").await, "5\n");
    assert_eq!(stdout_of("p=a/b/c.txt; echo ${p##*/}").await, "c.txt\n");
    assert_eq!(stdout_of("p=a/b/c.txt; echo ${p#*/}").await, "b/c.txt\n");
    assert_eq!(stdout_of("p=a/b/c.txt; echo ${p%.txt}").await, "a/b/c\n");
    assert_eq!(stdout_of("p=a.b.c; echo ${p%%.*}").await, "a\n");
    assert_eq!(stdout_of("x=banana; echo ${x/an/AN}").await, "bANana\n");
    assert_eq!(stdout_of("x=banana; echo ${x//an/AN}").await, "bANANa\n");
    assert_eq!(stdout_of("x=banana; echo ${x/#ba/BA}").await, "BAnana\n");
    assert_eq!(stdout_of("x=banana; echo ${x/%na/NA}").await, "banaNA\n");
}

#[tokio::test]
async fn substring_and_case_ops() {
    assert_eq!(stdout_of("x=abcdef; echo ${x:2}").await, "cdef\n");
    assert_eq!(stdout_of("x=abcdef; echo ${x:1:3}").await, "bcd\n");
    assert_eq!(stdout_of("x=abcdef; echo ${x: -2}").await, "ef\n");
    assert_eq!(stdout_of("x=hello; echo ${x^} ${x^^}").await, "Hello HELLO\n");
    assert_eq!(stdout_of("x=HELLO; echo ${x,} ${x,,}").await, "hELLO hello\n");
}

#[tokio::test]
async fn indirection_and_transforms() {
    assert_eq!(stdout_of("a=b; b=target; echo ${!a}").await, "target\n");
    assert_eq!(stdout_of("x='a b'; echo ${x@Q}").await, "'a b'\n");
}

#[tokio::test]
async fn arrays_basics() {
    assert_eq!(stdout_of("a=(x y z); echo ${a[1]}").await, "y\n");
    assert_eq!(stdout_of("a=(x y z); echo ${a[@]}").await, "x y z\n");
    assert_eq!(stdout_of("a=(x y z); echo ${#a[@]}").await, "3\n");
    assert_eq!(stdout_of("a=(x); a[2]=z; echo ${a[2]}:${#a[@]}").await, "z:3\n");
    assert_eq!(
        stdout_of("a=(1 2 3); for v in \"${a[@]}\"; do echo -n \"<$v>\"; done; echo").await,
        "<1><2><3>\n"
    );
}

// =============================================================================
// COMMAND SUBSTITUTION
// =============================================================================

#[tokio::test]
async fn command_substitution_strips_trailing_newlines() {
    assert_eq!(stdout_of("x=$(echo hi); echo \"[$x]\"").await, "[hi]\n");
    assert_eq!(stdout_of("x=`echo back`; echo $x").await, "back\n");
}

#[tokio::test]
async fn command_substitution_sets_status() {
    assert_eq!(stdout_of("x=$(false); echo $?").await, "1\n");
    assert_eq!(stdout_of("x=$(exit 3); echo $?").await, "3\n");
}

#[tokio::test]
async fn command_substitution_is_isolated() {
    assert_eq!(stdout_of("v=outer; x=$(v=inner; echo $v); echo $v:$x").await, "outer:inner\n");
}

#[tokio::test]
async fn nested_substitution() {
    assert_eq!(stdout_of("echo $(echo $(echo deep))").await, "deep\n");
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

#[tokio::test]
async fn while_until_loops() {
    assert_eq!(
        stdout_of("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done").await,
        "0\n1\n2\n"
    );
    assert_eq!(
        stdout_of("i=0; until [ $i -ge 2 ]; do echo $i; i=$((i+1)); done").await,
        "0\n1\n"
    );
}

#[tokio::test]
async fn arith_for_loop() {
    assert_eq!(
        stdout_of("for ((i=0; i<3; i++)); do echo $i; done").await,
        "0\n1\n2\n"
    );
}

#[tokio::test]
async fn break_exits_exact_levels() {
    // break 2 exits both loops
    assert_eq!(
        stdout_of(
            "for i in 1 2; do for j in a b; do echo $i$j; break 2; done; done; echo end"
        )
        .await,
        "1a\nend\n"
    );
    // break 1 exits only the inner loop
    assert_eq!(
        stdout_of(
            "for i in 1 2; do for j in a b; do echo $i$j; break; done; done; echo end"
        )
        .await,
        "1a\n2a\nend\n"
    );
}

#[tokio::test]
async fn continue_skips_iteration() {
    assert_eq!(
        stdout_of("for i in 1 2 3; do if [ $i = 2 ]; then continue; fi; echo $i; done").await,
        "1\n3\n"
    );
    // continue 2 finishes the current inner pass and continues the outer
    assert_eq!(
        stdout_of(
            "for i in 1 2; do for j in a b; do continue 2; echo inner; done; echo skipped; done; echo end"
        )
        .await,
        "end\n"
    );
}

#[tokio::test]
async fn case_terminators() {
    assert_eq!(
        stdout_of("case b in a) echo A;; b) echo B;; c) echo C;; esac").await,
        "B\n"
    );
    // ;& falls through unconditionally
    assert_eq!(
        stdout_of("case a in a) echo A;& b) echo B;; c) echo C;; esac").await,
        "A\nB\n"
    );
    // ;;& keeps testing patterns
    assert_eq!(
        stdout_of("case ab in a*) echo first;;& *b) echo second;; esac").await,
        "first\nsecond\n"
    );
}

#[tokio::test]
async fn case_patterns_glob() {
    assert_eq!(stdout_of("case hello.txt in *.txt) echo text;; esac").await, "text\n");
    assert_eq!(
        stdout_of("x='h*'; case 'h*' in $x) echo pat;; esac").await,
        "pat\n"
    );
    // Quoted pattern is literal
    assert_eq!(
        stdout_of("case hello in 'h*') echo lit;; *) echo glob;; esac").await,
        "glob\n"
    );
}

#[tokio::test]
async fn subshell_isolation() {
    assert_eq!(stdout_of("x=outer; (x=inner; echo $x); echo $x").await, "inner\nouter\n");
    assert_eq!(stdout_of("(cd /; pwd); echo done").await, "/\ndone\n");
    assert_eq!(stdout_of("(exit 5); echo $?").await, "5\n");
}

#[tokio::test]
async fn group_shares_state() {
    assert_eq!(stdout_of("{ x=1; }; echo $x").await, "1\n");
}

// =============================================================================
// ERREXIT RULES
// =============================================================================

#[tokio::test]
async fn errexit_aborts_on_failure() {
    let (stdout, _, status) = run("set -e; false; echo unreachable").await;
    assert_eq!(stdout, "");
    assert_eq!(status, 1);
}

#[tokio::test]
async fn negated_pipeline_never_trips_errexit() {
    let (stdout, _, status) = run("set -e; ! true; echo ok").await;
    assert_eq!(stdout, "ok\n");
    assert_eq!(status, 0);
}

#[tokio::test]
async fn and_or_left_operand_suppressed() {
    assert_eq!(stdout_of("set -e; false && echo no; echo ok").await, "ok\n");
    assert_eq!(stdout_of("set -e; false || echo alt; echo ok").await, "alt\nok\n");
}

#[tokio::test]
async fn errexit_fires_on_final_or_operand() {
    let (stdout, _, status) = run("set -e; true && false; echo unreachable").await;
    assert_eq!(stdout, "");
    assert_eq!(status, 1);
}

#[tokio::test]
async fn while_condition_suppresses_errexit() {
    let (stdout, _, status) = run("set -e; while false; do :; done; echo ok").await;
    assert_eq!(stdout, "ok\n");
    assert_eq!(status, 0);
}

// =============================================================================
// REDIRECTIONS AND HEREDOCS
// =============================================================================

#[tokio::test]
async fn file_redirection_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("cd {};", dir.path().display());
    let (stdout, _, _) = run(&format!(
        "{} echo first > f.txt; echo second >> f.txt; cat f.txt",
        base
    ))
    .await;
    assert_eq!(stdout, "first\nsecond\n");
}

#[tokio::test]
async fn truncation_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("cd {};", dir.path().display());
    let (stdout, _, _) = run(&format!(
        "{} echo data > f.txt; : > f.txt; cat f.txt; echo end",
        base
    ))
    .await;
    assert_eq!(stdout, "end\n");
}

#[tokio::test]
async fn stderr_redirection_order_matters() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("cd {};", dir.path().display());

    // >out 2>&1 : both streams land in the file
    let (stdout, stderr, _) = run(&format!(
        "{} ls /nonexistent-path-xyz > f.txt 2>&1; cat f.txt",
        base
    ))
    .await;
    assert_eq!(stderr, "");
    assert!(stdout.contains("nonexistent-path-xyz"));

    // 2>&1 >out : stderr goes to the parent stdout
    let (stdout2, stderr2, _) = run(&format!(
        "{} ls /nonexistent-path-xyz 2>&1 > g.txt",
        base
    ))
    .await;
    assert_eq!(stderr2, "");
    assert!(stdout2.contains("nonexistent-path-xyz"));
}

#[tokio::test]
async fn input_redirection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("in.txt"), "from file\n").unwrap();
    let (stdout, _, _) = run(&format!(
        "cd {}; cat < in.txt",
        dir.path().display()
    ))
    .await;
    assert_eq!(stdout, "from file\n");
}

#[tokio::test]
async fn missing_input_fails_command_only() {
    let (stdout, stderr, status) = run("cat < /no/such/file-xyz; echo status=$?").await;
    assert!(stderr.contains("No such file"));
    assert_eq!(stdout, "status=1\n");
    assert_eq!(status, 0);
}

#[tokio::test]
async fn noclobber_and_override() {
    let dir = tempfile::tempdir().unwrap();
    let base = format!("cd {};", dir.path().display());
    let (stdout, stderr, _) = run(&format!(
        "{} set -C; echo one > f.txt; echo two > f.txt; echo status=$?; echo three >| f.txt; cat f.txt",
        base
    ))
    .await;
    assert!(stderr.contains("cannot overwrite"));
    assert!(stdout.contains("status=1"));
    assert!(stdout.contains("three"));
}

#[tokio::test]
async fn heredoc_expansion() {
    assert_eq!(
        stdout_of("x=world; cat <<EOF\nhello $x\nEOF").await,
        "hello world\n"
    );
    // Quoted delimiter suppresses expansion
    assert_eq!(
        stdout_of("x=world; cat <<'EOF'\nhello $x\nEOF").await,
        "hello $x\n"
    );
}

#[tokio::test]
async fn heredoc_strip_tabs() {
    assert_eq!(
        stdout_of("cat <<-EOF\n\tindented\n\tEOF").await,
        "indented\n"
    );
}

#[tokio::test]
async fn here_string() {
    assert_eq!(stdout_of("cat <<< 'one line'").await, "one line\n");
    assert_eq!(stdout_of("read x <<< 'a b'; echo [$x]").await, "[a b]\n");
}

#[tokio::test]
async fn while_read_over_heredoc() {
    assert_eq!(
        stdout_of("while read l; do echo got:$l; done <<EOF\nx\ny\nEOF").await,
        "got:x\ngot:y\n"
    );
}

// =============================================================================
// PIPELINES
// =============================================================================

#[tokio::test]
async fn pipeline_chains_stdout() {
    assert_eq!(stdout_of("echo hello | cat").await, "hello\n");
    assert_eq!(stdout_of("printf 'b\\na\\n' | sort").await, "a\nb\n");
}

#[tokio::test]
async fn pipefail_picks_rightmost_failure() {
    assert_eq!(stdout_of("false | true; echo $?").await, "0\n");
    assert_eq!(
        stdout_of("set -o pipefail; false | true; echo $?").await,
        "1\n"
    );
}

#[tokio::test]
async fn pipeline_stage_mutations_do_not_escape() {
    assert_eq!(stdout_of("x=keep; echo v | read x; echo $x").await, "keep\n");
}

#[tokio::test]
async fn negation_maps_status() {
    assert_eq!(stdout_of("! false; echo $?").await, "0\n");
    assert_eq!(stdout_of("! true; echo $?").await, "1\n");
}

// =============================================================================
// EXTERNALS AND DISPATCH
// =============================================================================

#[tokio::test]
async fn command_not_found_is_127() {
    let (_, stderr, _) = run("definitely-not-a-command-xyz; echo $? > /dev/null").await;
    assert!(stderr.contains("command not found"));
    let (stdout, _, _) = run("definitely-not-a-command-xyz 2>/dev/null; echo $?").await;
    assert_eq!(stdout, "127\n");
}

#[tokio::test]
async fn path_cache_invalidated_on_path_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let tool = dir.path().join("mytool-xyz");
    std::fs::write(&tool, "#!/bin/sh\necho from-tempdir\n").unwrap();
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let script = format!(
        "mytool-xyz 2>/dev/null; echo $?; PATH={}:$PATH; mytool-xyz",
        dir.path().display()
    );
    let (stdout, _, _) = run(&script).await;
    assert_eq!(stdout, "127\nfrom-tempdir\n");
}

#[tokio::test]
async fn temp_assignment_exported_to_child_only() {
    let (stdout, _, _) = run("TEMPVAR_XYZ=hello /bin/sh -c 'echo $TEMPVAR_XYZ'; echo [${TEMPVAR_XYZ:-unset}]").await;
    assert_eq!(stdout, "hello\n[unset]\n");
}

#[tokio::test]
async fn exported_variables_reach_children() {
    let (stdout, _, _) = run("export EXP_XYZ=visible; /bin/sh -c 'echo $EXP_XYZ'").await;
    assert_eq!(stdout, "visible\n");
}

#[tokio::test]
async fn unexported_variables_do_not_reach_children() {
    let (stdout, _, _) = run("PRIV_XYZ=hidden; /bin/sh -c 'echo [$PRIV_XYZ]'").await;
    assert_eq!(stdout, "[]\n");
}

#[tokio::test]
async fn signal_death_reports_128_plus_n() {
    let (stdout, _, _) = run("/bin/sh -c 'kill -TERM $$'; echo $?").await;
    assert_eq!(stdout, "143\n");
}

// =============================================================================
// VARIABLES AND SCOPES
// =============================================================================

#[tokio::test]
async fn readonly_is_enforced() {
    let (_, stderr, status) = run("readonly R_XYZ=1; R_XYZ=2").await;
    assert!(stderr.contains("readonly"));
    assert_eq!(status, 1);
    let (_, stderr, _) = run("readonly R2_XYZ=1; unset R2_XYZ").await;
    assert!(stderr.contains("readonly"));
}

#[tokio::test]
async fn local_variables_shadow_and_restore() {
    assert_eq!(
        stdout_of("x=outer; f() { local x=inner; echo $x; }; f; echo $x").await,
        "inner\nouter\n"
    );
}

#[tokio::test]
async fn shift_moves_positionals() {
    assert_eq!(stdout_of("set -- a b c; shift; echo $1 $#").await, "b 2\n");
    assert_eq!(stdout_of("set -- a b c; shift 2; echo $1 $#").await, "c 1\n");
}

#[tokio::test]
async fn special_parameters() {
    assert_eq!(stdout_of("set -- a b; echo $#").await, "2\n");
    assert_eq!(stdout_of("false; echo $?").await, "1\n");
    let (stdout, _, _) = run("echo $$").await;
    assert_eq!(stdout.trim().parse::<u32>().unwrap(), std::process::id());
}

#[tokio::test]
async fn alias_expansion() {
    assert_eq!(stdout_of("alias ll='echo listed'; ll now").await, "listed now\n");
}

#[tokio::test]
async fn eval_runs_in_current_shell() {
    assert_eq!(stdout_of("eval 'x=42; echo $x'; echo $x").await, "42\n42\n");
}

#[tokio::test]
async fn source_runs_in_current_shell() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lib.sh");
    std::fs::write(&file, "sourced_var=yes\nreturn 5\necho never\n").unwrap();
    let (stdout, _, _) = run(&format!(
        ". {}; echo $?:$sourced_var",
        file.display()
    ))
    .await;
    assert_eq!(stdout, "5:yes\n");
}

// =============================================================================
// CONDITIONALS AND ARITHMETIC COMMANDS
// =============================================================================

#[tokio::test]
async fn arith_command_status() {
    assert_eq!(stdout_of("((1)); echo $?").await, "0\n");
    assert_eq!(stdout_of("((0)); echo $?").await, "1\n");
    assert_eq!(stdout_of("x=3; ((x > 2)) && echo big").await, "big\n");
}

#[tokio::test]
async fn double_bracket_basics() {
    assert_eq!(stdout_of("[[ abc == a* ]] && echo match").await, "match\n");
    assert_eq!(stdout_of("x=5; [[ $x -gt 3 && $x -lt 10 ]] && echo in-range").await, "in-range\n");
    assert_eq!(
        stdout_of("[[ $unset_var_x ]] || echo empty").await,
        "empty\n"
    );
}

#[tokio::test]
async fn regex_match_with_rematch() {
    assert_eq!(
        stdout_of("v=2026-08-01; [[ $v =~ ^([0-9]+)- ]] && echo ${BASH_REMATCH[1]}").await,
        "2026\n"
    );
}

// =============================================================================
// BACKGROUND JOBS AND TRAPS
// =============================================================================

#[tokio::test]
async fn background_and_wait() {
    let (stdout, _, _) = run("echo bg-output & wait").await;
    assert!(stdout.contains("bg-output"));
}

#[tokio::test]
async fn bang_bg_pid_is_set() {
    assert_eq!(stdout_of("true & [ -n \"$!\" ] && echo have-pid; wait").await, "have-pid\n");
}

#[tokio::test]
async fn err_trap_fires_on_failure() {
    let (stdout, _, _) = run("trap 'echo err-fired' ERR; false; true").await;
    assert_eq!(stdout, "err-fired\n");
}

// =============================================================================
// QUOTING FORMS
// =============================================================================

#[tokio::test]
async fn ansi_c_quoting() {
    assert_eq!(stdout_of("printf '%s' $'a\\tb'").await, "a\tb");
    assert_eq!(stdout_of("x=$'line1\\nline2'; echo \"$x\"").await, "line1\nline2\n");
}

#[tokio::test]
async fn escapes_outside_quotes() {
    assert_eq!(stdout_of("echo a\\$b").await, "a$b\n");
    assert_eq!(stdout_of("echo \\\"quoted\\\"").await, "\"quoted\"\n");
}

#[tokio::test]
async fn double_quote_expansions() {
    assert_eq!(stdout_of("x=v; echo \"val=$x len=${#x} arith=$((1+1))\"").await, "val=v len=1 arith=2\n");
}

#[tokio::test]
async fn dollar_star_vs_at_unquoted() {
    assert_eq!(stdout_of("set -- 'a b' c; echo $#").await, "2\n");
    // Unquoted both resplit
    assert_eq!(
        stdout_of("set -- 'a b' c; for x in $@; do echo [$x]; done").await,
        "[a]\n[b]\n[c]\n"
    );
}

#[tokio::test]
async fn brace_range_expansion() {
    assert_eq!(stdout_of("echo {1..5}").await, "1 2 3 4 5\n");
    assert_eq!(stdout_of("echo {a..c}").await, "a b c\n");
    assert_eq!(stdout_of("echo {5..1..2}").await, "5 3 1\n");
    assert_eq!(stdout_of("echo x{1..3}y").await, "x1y x2y x3y\n");
}

#[tokio::test]
async fn getopts_in_script() {
    let script = r#"
parse() {
  while getopts "ab:" opt "$@"; do
    case $opt in
      a) echo flag-a;;
      b) echo got-b=$OPTARG;;
    esac
  done
}
OPTIND=1
parse -a -b value
"#;
    assert_eq!(stdout_of(script).await, "flag-a\ngot-b=value\n");
}

#[tokio::test]
async fn printf_formats() {
    assert_eq!(stdout_of("printf '%s-%d\\n' abc 42").await, "abc-42\n");
    assert_eq!(stdout_of("printf '%x\\n' 255").await, "ff\n");
}

#[tokio::test]
async fn exit_status_of_script() {
    let (_, _, status) = run("exit 42").await;
    assert_eq!(status, 42);
}

#[tokio::test]
async fn functions_override_externals_not_builtins() {
    // A function may shadow an external name
    assert_eq!(
        stdout_of("ls() { echo shadowed; }; ls").await,
        "shadowed\n"
    );
    // Special builtins cannot be shadowed by functions
    assert_eq!(
        stdout_of("eval() { echo shadowed; }; eval 'echo real'").await,
        "real\n"
    );
}

#[tokio::test]
async fn xtrace_prints_commands() {
    let (_, stderr, _) = run("set -x; echo traced").await;
    assert!(stderr.contains("+ echo traced"));
}

#[tokio::test]
async fn line_numbers_in_lineno() {
    assert_eq!(stdout_of("echo $LINENO\necho $LINENO").await, "1\n2\n");
}
