//! Prompt templates for pattern inference and script synthesis.
//!
//! Every prompt instructs the model to finish its reply with a fenced
//! code block; `llm::parse::final_code_block` depends on that contract.

/// Initial request for a regex that matches every representative line.
pub fn pattern_inference_prompt(lines: &[String]) -> String {
    format!(
        r#"Here are several strings, one per line:

```
{}
```

Respond with a regular expression that matches all of the strings.
Return the regex in a code block (``` ... ```) at the end of your message.

Examples:

Input:

    ```
    123
    456
    789
    ```

Output:

    ```
    ^\d+$
    ```

Input:

    ```
    123
    -45.6
    789
    ```

Output:

    ```
    ^-?\d+(\.\d*)?$
    ```


Input:

    ```
    2020-01-02T03:04:05.678Z   1
    2020-01-02T03:05:05.678Z   2
    2020-01-02T03:08:05.678Z   1
    ```

Output:

    ```
    ^\d{{4}}-\d{{2}}-\d{{2}}T\d{{2}}:\d{{2}}:\d{{2}}\.\d+Z\s+\d+$
    ```

"#,
        lines.join("\n")
    )
}

/// Follow-up when the proposed regex missed some lines.
pub fn pattern_repair_prompt(failures: &str) -> String {
    format!(
        "The regex failed to match the following lines:\n\n{}\n\nPlease fix the regex.",
        failures
    )
}

/// Follow-up when the proposed regex did not compile at all.
pub fn pattern_invalid_prompt(error: &str) -> String {
    format!(
        "The regex is not a valid regular expression:\n\n{}\n\nPlease fix the regex.",
        error
    )
}

/// How many data lines the synthesis prompt shows the model.
const SYNTHESIS_SAMPLE_LINES: usize = 10;

/// Initial request for a complete plotting script.
pub fn synthesis_prompt(instructions: &str, sample: &[String]) -> String {
    let shown: Vec<&str> = sample
        .iter()
        .take(SYNTHESIS_SAMPLE_LINES)
        .map(String::as_str)
        .collect();
    format!(
        r#"Generate a Python script that uses plotly to create a visualization based on these instructions: "{}"

Here are the first few lines of the data:
```
{}
```

The script should:
1. Read data from stdin (using sys.stdin)
2. Parse the data appropriately based on the format shown
3. Create a plotly visualization according to the instructions
4. Display the plot using plotly.graph_objects or plotly.express
5. Accept an optional `--dry-run` flag; if given, it still makes almost all the Plotly calls, to reveal any errors; it just skips the `.show()` at the end.

Libraries available: plotly, numpy, scipy

Return the COMPLETE Python script in a code block (``` ... ```) at the end of your message. The script should be complete and runnable."#,
        instructions,
        shown.join("\n")
    )
}

/// Follow-up when the candidate script failed its dry run.
pub fn script_repair_prompt(error: &str) -> String {
    format!(
        "The script failed with this error:\n```\n{}\n```\n\nPlease fix the script and provide ONLY the corrected Python code, nothing else.",
        error
    )
}
